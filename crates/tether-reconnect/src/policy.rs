//! Reconnect configuration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use rand::Rng;
use tracing::warn;

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// How long to wait before reconnect attempt `n` (0-based, reset on open).
#[derive(Clone)]
pub enum Delay {
    /// The same delay every time.
    Fixed(Duration),
    /// `base + step * attempt`.
    Linear { base: Duration, step: Duration },
    /// `base * factor^attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
    /// Any function of the attempt index.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Delay {
    /// Wraps a closure as a [`Delay::Custom`].
    pub fn custom(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// The delay before attempt `attempt`, without jitter.
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Delay::Fixed(delay) => *delay,
            Delay::Linear { base, step } => base.saturating_add(step.saturating_mul(attempt)),
            Delay::Exponential { base, factor, max } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = base.as_secs_f64() * factor.powi(exponent);
                if secs.is_finite() && secs < max.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    *max
                }
            }
            Delay::Custom(f) => f(attempt),
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::Fixed(ReconnectPolicy::DEFAULT_DELAY)
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Delay::Linear { base, step } => f
                .debug_struct("Linear")
                .field("base", base)
                .field("step", step)
                .finish(),
            Delay::Exponential { base, factor, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("factor", factor)
                .field("max", max)
                .finish(),
            Delay::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// URL resolution
// ---------------------------------------------------------------------------

/// Failure to produce a URL for a connection attempt.
///
/// A failed resolution is handled like a failed connect: it costs one
/// attempt and the controller schedules the next one.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("url resolution failed: {0}")]
    Failed(String),

    #[error("url resolution failed")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Produces the URL for one connection attempt.
///
/// Called before every attempt, including the first. The result is used for
/// that attempt only, so the resolver may embed short-lived tokens.
pub type UrlResolver = Arc<dyn Fn() -> BoxFuture<'static, Result<String, ResolveError>> + Send + Sync>;

/// Builds a [`UrlResolver`] from an async closure.
///
/// ```rust
/// use tether_reconnect::{url_resolver, ResolveError};
///
/// let resolver = url_resolver(|| async {
///     Ok::<_, ResolveError>("ws://127.0.0.1:9000/?token=abc".to_owned())
/// });
/// # let _ = resolver;
/// ```
pub fn url_resolver<F, Fut>(f: F) -> UrlResolver
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ResolveError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Reconnect behaviour of one durable socket. Fixed for the socket's lifetime.
#[derive(Clone)]
pub struct ReconnectPolicy {
    /// Backoff curve.
    pub delay: Delay,
    /// Reconnect attempts allowed after a loss before giving up.
    /// `None` retries forever.
    pub retries: Option<u32>,
    /// Upper bound of a random extra delay added to every computed delay.
    /// Zero disables jitter.
    pub jitter: Duration,
    /// Per-attempt URL source. `None` reuses the socket's URL.
    pub url_resolver: Option<UrlResolver>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Delay::default(),
            retries: None,
            jitter: Duration::ZERO,
            url_resolver: None,
        }
    }
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectPolicy")
            .field("delay", &self.delay)
            .field("retries", &self.retries)
            .field("jitter", &self.jitter)
            .field("url_resolver", &self.url_resolver.as_ref().map(|_| ".."))
            .finish()
    }
}

impl ReconnectPolicy {
    /// Delay used when none is configured.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

    /// Longest delay ever returned by [`Self::delay_for`]. Larger curve
    /// values are cut down to it.
    pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Smallest growth factor accepted for [`Delay::Exponential`].
    pub const MIN_FACTOR: f64 = 1.0;

    /// A policy with a fixed delay and unbounded retries.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay: Delay::Fixed(delay),
            ..Default::default()
        }
    }

    /// A policy with capped exponential backoff and unbounded retries.
    pub fn exponential(base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            delay: Delay::Exponential { base, factor, max },
            ..Default::default()
        }
    }

    /// Limits the number of reconnect attempts after a loss.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Adds up to `jitter` of random delay to every attempt.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Resolves the URL afresh before every attempt.
    pub fn with_url_resolver(mut self, resolver: UrlResolver) -> Self {
        self.url_resolver = Some(resolver);
        self
    }

    /// Clamps out-of-range values so the policy is safe to use.
    ///
    /// Called automatically by [`ReconnectController::new`](crate::ReconnectController::new).
    /// Rules:
    /// - an exponential `factor` below [`Self::MIN_FACTOR`] (or NaN) becomes
    ///   [`Self::MIN_FACTOR`];
    /// - an exponential `max` below `base` becomes `base`.
    pub fn validated(mut self) -> Self {
        if let Delay::Exponential { base, factor, max } = &mut self.delay {
            if factor.is_nan() || *factor < Self::MIN_FACTOR {
                warn!(factor = *factor, "backoff factor below 1.0, clamping");
                *factor = Self::MIN_FACTOR;
            }
            if *max < *base {
                warn!(
                    base_ms = base.as_millis() as u64,
                    max_ms = max.as_millis() as u64,
                    "backoff max below base, raising"
                );
                *max = *base;
            }
        }
        self
    }

    /// The delay before attempt `attempt`, including jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay.for_attempt(attempt);
        let jitter_us = u64::try_from(self.jitter.as_micros()).unwrap_or(u64::MAX);
        let delay = if jitter_us == 0 {
            delay
        } else {
            let extra = rand::rng().random_range(0..jitter_us);
            delay.saturating_add(Duration::from_micros(extra))
        };
        delay.min(Self::MAX_DELAY)
    }

    /// The URL for the next attempt: the resolver's answer if one is
    /// configured, otherwise `fallback`.
    pub fn resolve(&self, fallback: &str) -> BoxFuture<'static, Result<String, ResolveError>> {
        match &self.url_resolver {
            Some(resolver) => resolver(),
            None => futures_util::future::ready(Ok(fallback.to_owned())).boxed(),
        }
    }
}
