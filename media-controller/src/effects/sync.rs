//! One-way mirrors from the store onto the element.

use super::EffectContext;
use crate::store::Subscription;
use crate::types::SeekRequest;
use common::PlaybackRate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(super) fn install(ctx: &EffectContext, parent: &CancellationToken) -> Vec<Subscription> {
    vec![
        play_pause(ctx, parent.child_token()),
        playback_rate(ctx),
        volume(ctx),
        mute(ctx),
        seek(ctx),
        fullscreen(ctx, parent.child_token()),
        picture_in_picture(ctx, parent.child_token()),
    ]
}

/// Toggle against the element's own paused state, not the stored one.
fn play_pause(ctx: &EffectContext, token: CancellationToken) -> Subscription {
    let effect = ctx.clone();
    ctx.store.subscribe(
        |state| state.controls.requested_play_pause_last_time,
        move |_, _| {
            let element = effect.element.clone();
            if element.paused() {
                effect.spawn_guarded(&token, async move {
                    if let Err(e) = element.play().await {
                        warn!("Play request rejected: {}", e);
                    }
                });
            } else {
                element.pause();
            }
        },
    )
}

fn playback_rate(ctx: &EffectContext) -> Subscription {
    let element = ctx.element.clone();
    ctx.store.subscribe(
        |state| state.playback_rate,
        move |rate: &PlaybackRate, _| element.set_playback_rate(rate.effective()),
    )
}

fn volume(ctx: &EffectContext) -> Subscription {
    let element = ctx.element.clone();
    ctx.store.subscribe(
        |state| (state.volume, state.device.is_volume_change_supported),
        move |&(volume, supported): &(f64, bool), _| {
            if supported {
                element.set_volume(volume);
            }
        },
    )
}

fn mute(ctx: &EffectContext) -> Subscription {
    let element = ctx.element.clone();
    ctx.store.subscribe(
        |state| state.muted,
        move |muted: &bool, previous: &bool| {
            if muted != previous {
                element.set_muted(*muted);
            }
        },
    )
}

/// Seek only once the element reports a ready state, or unconditionally
/// when it does not report one at all.
fn seek(ctx: &EffectContext) -> Subscription {
    let element = ctx.element.clone();
    ctx.store.subscribe(
        |state| state.controls.requested_seek,
        move |request: &Option<SeekRequest>, _| {
            let Some(request) = request else {
                return;
            };
            match element.ready_state() {
                Some(0) => debug!("Element not ready, skipping seek to {}", request.target),
                _ => element.set_current_time(request.target),
            }
        },
    )
}

fn fullscreen(ctx: &EffectContext, token: CancellationToken) -> Subscription {
    let effect = ctx.clone();
    ctx.store.subscribe(
        |state| state.controls.requested_fullscreen_last_time,
        move |_, _| {
            let element = effect.element.clone();
            effect.spawn_guarded(&token, async move {
                let result = if element.is_fullscreen() {
                    element.exit_fullscreen().await
                } else {
                    element.request_fullscreen().await
                };
                if let Err(e) = result {
                    warn!("Fullscreen toggle failed: {}", e);
                }
            });
        },
    )
}

/// PiP failures downgrade the capability flag instead of surfacing an error.
fn picture_in_picture(ctx: &EffectContext, token: CancellationToken) -> Subscription {
    let effect = ctx.clone();
    ctx.store.subscribe(
        |state| state.controls.requested_picture_in_picture_last_time,
        move |_, _| {
            let element = effect.element.clone();
            let store = effect.store.clone();
            effect.spawn_guarded(&token, async move {
                let result = if element.is_picture_in_picture() {
                    element.exit_picture_in_picture().await
                } else {
                    element.request_picture_in_picture().await
                };
                if let Err(e) = result {
                    warn!("Picture in picture is not supported: {}", e);
                    store.update_device(|device| device.is_picture_in_picture_supported = false);
                }
            });
        },
    )
}
