use super::EffectContext;
use crate::intents::now_ms;
use crate::store::{ControllerStore, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const CACHE_BUST_PARAM: &str = "v";

/// `thumbnail` with the cache-busting parameter set to `stamp`.
pub fn cache_busted(thumbnail: &str, stamp: u64) -> Option<String> {
    let mut url = match Url::parse(thumbnail) {
        Ok(url) => url,
        Err(e) => {
            warn!("Invalid thumbnail URL {}: {}", thumbnail, e);
            return None;
        }
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != CACHE_BUST_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(CACHE_BUST_PARAM, &stamp.to_string());

    Some(url.to_string())
}

/// Refresh the poster of a live stream from its thumbnail on a fixed period,
/// and mirror the stored poster onto the element.
pub(super) fn install(ctx: &EffectContext, token: CancellationToken) -> Vec<Subscription> {
    let period = ctx.store.read(|state| state.initial_props.poster_live_update);
    let refresh = Arc::new(PosterRefresh {
        ctx: ctx.clone(),
        token,
        period,
        current: Mutex::new(None),
    });

    let initial = ctx
        .store
        .read(|state| (state.controls.thumbnail.clone(), state.live));
    refresh.apply(&initial);

    let on_change = refresh.clone();
    let refresh_subscription = ctx.store.subscribe(
        |state| (state.controls.thumbnail.clone(), state.live),
        move |next: &(Option<String>, bool), _| on_change.apply(next),
    );

    let element = ctx.element.clone();
    let mirror_subscription = ctx.store.subscribe(
        |state| state.poster.clone(),
        move |poster: &Option<String>, _| element.set_poster(poster.as_deref()),
    );

    vec![refresh_subscription, mirror_subscription]
}

struct PosterRefresh {
    ctx: EffectContext,
    token: CancellationToken,
    period: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl PosterRefresh {
    fn apply(&self, (thumbnail, live): &(Option<String>, bool)) {
        if let Some(previous) = self.current.lock().take() {
            previous.cancel();
        }

        let Some(thumbnail) = thumbnail.clone().filter(|_| *live) else {
            return;
        };
        if self.period.is_zero() {
            return;
        }

        debug!("Refreshing poster from {} every {:?}", thumbnail, self.period);
        let interval_token = self.token.child_token();
        *self.current.lock() = Some(interval_token.clone());

        let store = self.ctx.store.clone();
        let period = self.period;
        self.ctx.spawn_guarded(&interval_token, refresh_loop(store, thumbnail, period));
    }
}

async fn refresh_loop(store: ControllerStore, thumbnail: String, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        match cache_busted(&thumbnail, now_ms()) {
            Some(poster) => store.set_poster(Some(poster)),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_busted_replaces_stamp() {
        let url = cache_busted("https://x/thumb.png?size=large&v=1", 42).unwrap();
        assert_eq!(url, "https://x/thumb.png?size=large&v=42");

        let url = cache_busted("https://x/thumb.png", 7).unwrap();
        assert_eq!(url, "https://x/thumb.png?v=7");

        assert!(cache_busted("not a url", 1).is_none());
    }
}
