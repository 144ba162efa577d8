//! Network liveness detection.
//!
//! Online means all three checks pass, evaluated in order and stopping at the
//! first failure: the platform connectivity flag, the OS network status (where
//! the platform has one), and an HTTP probe of an unauthenticated health
//! endpoint. Only the probe touches the network; it is time-bounded and its
//! result is reused for a short interval.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// Tuning for [`LivenessDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Upper bound on a single health probe
    pub probe_timeout: Duration,
    /// Probe results younger than this are reused
    pub probe_min_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            probe_min_interval: Duration::from_secs(5),
        }
    }
}

/// Connectivity signals supplied by the host platform.
pub trait PlatformNetwork: Send + Sync + 'static {
    /// Instantaneous connectivity flag; must not perform I/O.
    fn reports_connected(&self) -> bool;

    /// OS-level network status. `None` when the platform has no such query.
    fn query_status(&self) -> impl Future<Output = Option<bool>> + Send {
        std::future::ready(None)
    }
}

/// Active reachability check against the remote service.
pub trait HealthProbe: Send + Sync + 'static {
    /// `true` when the service answered at all, whatever the status code.
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Anything that can answer "is the remote reachable right now".
pub trait ConnectivityCheck: Send + Sync + 'static {
    fn is_online(&self) -> impl Future<Output = bool> + Send;
}

/// Platform flag controlled by the host process.
#[derive(Debug, Clone)]
pub struct ManualNetwork {
    connected: Arc<AtomicBool>,
}

impl ManualNetwork {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl PlatformNetwork for ManualNetwork {
    fn reports_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// GETs a health endpoint with a bounded timeout.
#[derive(Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            timeout,
        })
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.client.get(&self.url).send()).await {
            Ok(Ok(response)) => {
                tracing::debug!("Health probe answered with HTTP {}", response.status());
                true
            }
            Ok(Err(error)) => {
                tracing::debug!("Health probe failed: {error}");
                false
            }
            Err(_) => {
                tracing::debug!("Health probe timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProbeSample {
    taken_at: Instant,
    reachable: bool,
}

pub struct LivenessDetector<P, H> {
    platform: P,
    probe: H,
    config: LivenessConfig,
    last_probe: Mutex<Option<ProbeSample>>,
    state: watch::Sender<bool>,
}

impl<P: PlatformNetwork, H: HealthProbe> LivenessDetector<P, H> {
    pub fn new(platform: P, probe: H, config: LivenessConfig) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            platform,
            probe,
            config,
            last_probe: Mutex::new(None),
            state,
        }
    }

    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Evaluate connectivity, reusing a recent probe result.
    pub async fn is_online(&self) -> bool {
        self.evaluate(false).await
    }

    /// Evaluate connectivity with a fresh probe.
    pub async fn check_now(&self) -> bool {
        self.evaluate(true).await
    }

    /// Re-evaluate after the platform reported a connectivity event.
    pub async fn notify_platform_change(&self) -> bool {
        self.evaluate(true).await
    }

    /// Last published state, without any I/O.
    pub fn current(&self) -> bool {
        *self.state.borrow()
    }

    /// Receive every change of the online state. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    async fn evaluate(&self, force_probe: bool) -> bool {
        let online = self.platform.reports_connected()
            && self.platform.query_status().await != Some(false)
            && self.probe_reachable(force_probe).await;
        self.publish(online);
        online
    }

    async fn probe_reachable(&self, force: bool) -> bool {
        // Held across the probe so concurrent callers share one request.
        let mut last = self.last_probe.lock().await;
        if !force {
            if let Some(sample) = *last {
                if sample.taken_at.elapsed() < self.config.probe_min_interval {
                    return sample.reachable;
                }
            }
        }

        let reachable = self.probe.probe().await;
        *last = Some(ProbeSample {
            taken_at: Instant::now(),
            reachable,
        });
        reachable
    }

    fn publish(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network is now {}",
                if online { "online" } else { "offline" }
            );
        }
    }
}

impl<P: PlatformNetwork, H: HealthProbe> ConnectivityCheck for LivenessDetector<P, H> {
    async fn is_online(&self) -> bool {
        self.evaluate(false).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeProbe;
    use super::*;
    use crate::testing::serve;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    struct OsReportsDown;

    impl PlatformNetwork for OsReportsDown {
        fn reports_connected(&self) -> bool {
            true
        }

        async fn query_status(&self) -> Option<bool> {
            Some(false)
        }
    }

    fn manual_detector(
        connected: bool,
        probe: &FakeProbe,
    ) -> LivenessDetector<ManualNetwork, FakeProbe> {
        LivenessDetector::new(
            ManualNetwork::new(connected),
            probe.clone(),
            LivenessConfig::default(),
        )
    }

    #[tokio::test]
    async fn platform_flag_short_circuits_probe() {
        let probe = FakeProbe::new(true);
        let detector = manual_detector(false, &probe);

        assert!(!detector.is_online().await);
        assert!(!detector.check_now().await);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn os_status_short_circuits_probe() {
        let probe = FakeProbe::new(true);
        let detector = LivenessDetector::new(OsReportsDown, probe.clone(), LivenessConfig::default());

        assert!(!detector.is_online().await);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn missing_os_query_defers_to_probe() {
        let probe = FakeProbe::new(true);
        let detector = manual_detector(true, &probe);
        assert!(detector.is_online().await);

        let unreachable = FakeProbe::new(false);
        let detector = manual_detector(true, &unreachable);
        assert!(!detector.is_online().await);
        assert_eq!(unreachable.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_result_is_reused_within_interval() {
        let probe = FakeProbe::new(true);
        let detector = manual_detector(true, &probe);

        assert!(detector.is_online().await);
        probe.set_reachable(false);
        assert!(detector.is_online().await);
        assert_eq!(probe.calls(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!detector.is_online().await);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn check_now_forces_fresh_probe() {
        let probe = FakeProbe::new(true);
        let detector = manual_detector(true, &probe);

        assert!(detector.is_online().await);
        probe.set_reachable(false);
        assert!(!detector.check_now().await);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_platform_and_manual_transitions() {
        let probe = FakeProbe::new(true);
        let detector = manual_detector(false, &probe);
        let mut updates = detector.subscribe();
        assert!(!*updates.borrow_and_update());

        detector.platform().set_connected(true);
        assert!(detector.notify_platform_change().await);
        assert!(updates.has_changed().unwrap());
        assert!(*updates.borrow_and_update());

        probe.set_reachable(false);
        assert!(!detector.check_now().await);
        assert!(updates.has_changed().unwrap());
        assert!(!*updates.borrow_and_update());
        assert!(!detector.current());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_probe_treats_error_status_as_reachable() {
        let base = serve(Router::new().route(
            "/health",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        let probe = HttpHealthProbe::new(format!("{base}/health"), Duration::from_secs(3)).unwrap();
        assert!(probe.probe().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_probe_times_out_as_unreachable() {
        let base = serve(Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        ))
        .await;

        let probe =
            HttpHealthProbe::new(format!("{base}/health"), Duration::from_millis(200)).unwrap();
        assert!(!probe.probe().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_probe_treats_refused_connection_as_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe =
            HttpHealthProbe::new(format!("http://{addr}/health"), Duration::from_secs(1)).unwrap();
        assert!(!probe.probe().await);
    }
}
