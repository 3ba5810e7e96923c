use super::EffectContext;
use crate::store::Subscription;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Show the controls on every interaction and hide them again after the
/// autohide duration, unless a newer interaction came in meanwhile.
pub(super) fn install(ctx: &EffectContext, token: CancellationToken) -> Option<Subscription> {
    let autohide = ctx.options.autohide;
    if autohide.is_zero() {
        return None;
    }

    let effect = ctx.clone();
    let pending: Mutex<Option<CancellationToken>> = Mutex::new(None);

    Some(ctx.store.subscribe(
        |state| state.controls.last_interaction,
        move |&last_interaction: &u64, _| {
            if last_interaction == 0 {
                return;
            }

            effect.store.set_hidden(false);

            let timer = token.child_token();
            if let Some(previous) = pending.lock().replace(timer.clone()) {
                previous.cancel();
            }

            let store = effect.store.clone();
            effect.spawn_guarded(&timer, async move {
                tokio::time::sleep(autohide).await;
                let (hidden, latest) =
                    store.read(|state| (state.hidden, state.controls.last_interaction));
                if !hidden && latest == last_interaction {
                    store.set_hidden(true);
                }
            });
        },
    ))
}
