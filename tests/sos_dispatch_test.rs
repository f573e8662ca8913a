use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use safeher::config::{DispatchConfig, LocationPolicy};
use safeher::contacts::{Contact, ContactInput, ContactStore};
use safeher::dispatch::channels::{Channel, ChannelError, LinkOpener, OpenError, SmsGateway};
use safeher::dispatch::location::{Coordinates, LocationError, LocationProvider, PermissionStatus};
use safeher::dispatch::{DispatchEngine, DispatchOutcome, DispatchReport};
use safeher::error::AppError;
use tokio_test::assert_ok;
use url::Url;

const KARACHI: Coordinates = Coordinates {
    latitude: 24.8607,
    longitude: 67.0011,
};

struct FakeLocation {
    permission: PermissionStatus,
    position: Option<Coordinates>,
    delay: Duration,
    prompt_delay: Duration,
    permission_requests: AtomicUsize,
}

impl FakeLocation {
    fn granted(position: Coordinates) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            position: Some(position),
            delay: Duration::ZERO,
            prompt_delay: Duration::ZERO,
            permission_requests: AtomicUsize::new(0),
        }
    }

    fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            position: None,
            delay: Duration::ZERO,
            prompt_delay: Duration::ZERO,
            permission_requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.prompt_delay).await;
        self.permission
    }

    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        tokio::time::sleep(self.delay).await;
        self.position
            .ok_or_else(|| LocationError::Unavailable("no fix".into()))
    }
}

#[derive(Default)]
struct FakeSms {
    unavailable: bool,
    batches: Mutex<Vec<(Vec<String>, String)>>,
}

#[async_trait]
impl SmsGateway for FakeSms {
    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn send_batch(&self, recipients: &[String], body: &str) -> Result<(), ChannelError> {
        self.batches
            .lock()
            .unwrap()
            .push((recipients.to_vec(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeLinks {
    /// Schemes with no installed handler
    missing: Vec<&'static str>,
    opened: Mutex<Vec<Url>>,
}

#[async_trait]
impl LinkOpener for FakeLinks {
    async fn open(&self, url: &Url) -> Result<(), OpenError> {
        if self.missing.contains(&url.scheme()) {
            return Err(OpenError::NoHandler);
        }
        self.opened.lock().unwrap().push(url.clone());
        Ok(())
    }
}

struct Harness {
    engine: DispatchEngine,
    location: Arc<FakeLocation>,
    sms: Arc<FakeSms>,
    links: Arc<FakeLinks>,
}

fn harness(location: FakeLocation, sms: FakeSms, links: FakeLinks, config: DispatchConfig) -> Harness {
    let location = Arc::new(location);
    let sms = Arc::new(sms);
    let links = Arc::new(links);
    let engine = DispatchEngine::new(location.clone(), sms.clone(), links.clone(), config);
    Harness {
        engine,
        location,
        sms,
        links,
    }
}

fn contacts(inputs: Vec<ContactInput>) -> Vec<Contact> {
    let mut store = ContactStore::new();
    for input in inputs {
        assert_ok!(store.add(input));
    }
    store.list().to_vec()
}

fn contact(name: &str, phone: Option<&str>, whatsapp: Option<&str>, email: Option<&str>) -> ContactInput {
    ContactInput {
        name: name.into(),
        phone: phone.map(String::from),
        whatsapp: whatsapp.map(String::from),
        email: email.map(String::from),
    }
}

fn dispatched(outcome: DispatchOutcome) -> DispatchReport {
    match outcome {
        DispatchOutcome::Dispatched(report) => report,
        other => panic!("expected a dispatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_contacts_makes_no_calls() {
    let h = harness(
        FakeLocation::granted(KARACHI),
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig::default(),
    );

    let outcome = h.engine.send_sos(&[]).await;

    assert!(matches!(outcome, DispatchOutcome::NoContacts));
    assert_eq!(h.location.permission_requests.load(Ordering::SeqCst), 0);
    assert!(h.sms.batches.lock().unwrap().is_empty());
    assert!(h.links.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_failure_only_affects_broken_contact() {
    let h = harness(
        FakeLocation::granted(KARACHI),
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig::default(),
    );
    let list = contacts(vec![
        contact("Mother", Some("+923001111111"), None, None),
        contact("Sister", Some("+923002222222"), None, None),
        contact("Neighbour", None, Some("call me maybe"), None),
    ]);

    let report = dispatched(h.engine.send_sos(&list).await);

    let batches = h.sms.batches.lock().unwrap();
    assert_eq!(batches.len(), 1, "all numbers go out in one batch");
    assert_eq!(batches[0].0, vec!["+923001111111", "+923002222222"]);
    assert_eq!(report.sms_recipients, batches[0].0);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].channel, Channel::WhatsApp);
    assert_eq!(failures[0].target, "Neighbour");
    assert!(matches!(
        failures[0].result,
        Err(ChannelError::InvalidTarget { .. })
    ));

    let notice = report.notice().expect("a failure should produce a notice");
    assert!(notice.contains("Neighbour"));
    assert!(!notice.contains("Mother"));
}

#[tokio::test]
async fn test_location_is_appended_to_every_channel() {
    let h = harness(
        FakeLocation::granted(KARACHI),
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig::default(),
    );
    let list = contacts(vec![contact(
        "Mother",
        Some("+923001111111"),
        Some("+92 300 1111111"),
        Some("mother@example.org"),
    )]);

    let report = dispatched(h.engine.send_sos(&list).await);
    assert_eq!(report.location, Some(KARACHI));
    assert_eq!(report.notice(), None);
    assert_eq!(report.attempts.len(), 3);

    let body = h.sms.batches.lock().unwrap()[0].1.clone();
    assert_eq!(
        body,
        "SOS Alert! I need urgent help. Please respond immediately.\n\
         Location: https://www.google.com/maps?q=24.8607,67.0011"
    );

    let opened = h.links.opened.lock().unwrap();
    let whatsapp = opened.iter().find(|u| u.scheme() == "whatsapp").unwrap();
    assert!(whatsapp.as_str().starts_with("whatsapp://send?phone=923001111111&text="));
    let text: String = whatsapp
        .query_pairs()
        .find(|(k, _)| k == "text")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(text, body);

    let mail = opened.iter().find(|u| u.scheme() == "mailto").unwrap();
    assert_eq!(mail.path(), "mother@example.org");
    let subject: String = mail
        .query_pairs()
        .find(|(k, _)| k == "subject")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(subject, "SOS Alert");
}

#[tokio::test]
async fn test_denied_location_degrades_by_default() {
    let h = harness(
        FakeLocation::denied(),
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig::default(),
    );
    let list = contacts(vec![contact("Mother", Some("+923001111111"), None, None)]);

    let report = dispatched(h.engine.send_sos(&list).await);

    assert_eq!(report.location, None);
    assert_eq!(
        h.sms.batches.lock().unwrap()[0].1,
        DispatchConfig::default().preamble
    );
}

#[tokio::test]
async fn test_denied_location_aborts_under_strict_policy() {
    let config = DispatchConfig {
        location_policy: LocationPolicy::Strict,
        ..DispatchConfig::default()
    };
    let h = harness(
        FakeLocation::denied(),
        FakeSms::default(),
        FakeLinks::default(),
        config,
    );
    let list = contacts(vec![contact(
        "Mother",
        Some("+923001111111"),
        None,
        Some("mother@example.org"),
    )]);

    let outcome = h.engine.send_sos(&list).await;

    assert!(matches!(outcome, DispatchOutcome::PermissionDenied));
    assert!(matches!(outcome.error(), Some(AppError::PermissionDenied)));
    assert!(h.sms.batches.lock().unwrap().is_empty());
    assert!(h.links.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_strict_policy_still_sends_when_fix_fails() {
    let config = DispatchConfig {
        location_policy: LocationPolicy::Strict,
        ..DispatchConfig::default()
    };
    let mut location = FakeLocation::granted(KARACHI);
    location.position = None;
    let h = harness(location, FakeSms::default(), FakeLinks::default(), config);
    let list = contacts(vec![contact("Mother", Some("+923001111111"), None, None)]);

    let report = dispatched(h.engine.send_sos(&list).await);
    assert_eq!(report.location, None);
    assert_eq!(h.sms.batches.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_location_times_out_and_degrades() {
    let mut location = FakeLocation::granted(KARACHI);
    location.delay = Duration::from_secs(60);
    let h = harness(
        location,
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig::default(),
    );
    let list = contacts(vec![contact("Mother", Some("+923001111111"), None, None)]);

    let started = tokio::time::Instant::now();
    let report = dispatched(h.engine.send_sos(&list).await);

    assert_eq!(report.location, None);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(h.sms.batches.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_permission_prompt_sends_without_location() {
    let mut location = FakeLocation::granted(KARACHI);
    location.prompt_delay = Duration::from_secs(3600);
    let h = harness(
        location,
        FakeSms::default(),
        FakeLinks::default(),
        DispatchConfig {
            location_policy: LocationPolicy::Strict,
            ..DispatchConfig::default()
        },
    );
    let list = contacts(vec![contact("Mother", Some("+923001111111"), None, None)]);

    let started = tokio::time::Instant::now();
    let report = dispatched(h.engine.send_sos(&list).await);

    assert_eq!(report.location, None);
    assert!(started.elapsed() < Duration::from_secs(3600));
    let batches = h.sms.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].1.contains("Location:"));
}

#[tokio::test]
async fn test_sms_unavailable_does_not_stop_links() {
    let sms = FakeSms {
        unavailable: true,
        ..FakeSms::default()
    };
    let h = harness(
        FakeLocation::granted(KARACHI),
        sms,
        FakeLinks::default(),
        DispatchConfig::default(),
    );
    let list = contacts(vec![contact(
        "Mother",
        Some("+923001111111"),
        None,
        Some("mother@example.org"),
    )]);

    let outcome = h.engine.send_sos(&list).await;
    assert!(matches!(outcome.error(), Some(AppError::ChannelUnavailable)));
    let report = dispatched(outcome);

    assert!(h.sms.batches.lock().unwrap().is_empty());
    assert_eq!(h.links.opened.lock().unwrap().len(), 1);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].result,
        Err(ChannelError::Unavailable(Channel::Sms))
    );
}

#[tokio::test]
async fn test_missing_whatsapp_app_is_channel_unavailable() {
    let links = FakeLinks {
        missing: vec!["whatsapp"],
        ..FakeLinks::default()
    };
    let h = harness(
        FakeLocation::granted(KARACHI),
        FakeSms::default(),
        links,
        DispatchConfig::default(),
    );
    let list = contacts(vec![
        contact("Mother", None, Some("+923001111111"), None),
        contact("Sister", None, Some("+923002222222"), Some("sister@example.org")),
    ]);

    let report = dispatched(h.engine.send_sos(&list).await);

    // No phone numbers, so no SMS batch at all
    assert!(report.sms_recipients.is_empty());
    assert!(report.attempts.iter().all(|a| a.channel != Channel::Sms));

    assert_eq!(report.failures().count(), 2);
    assert!(report
        .failures()
        .all(|a| a.result == Err(ChannelError::Unavailable(Channel::WhatsApp))));
    assert_eq!(report.delivered(), 1);

    let notice = report.notice().unwrap();
    assert!(notice.starts_with("SOS sent, but some alerts failed"));
}

#[tokio::test]
async fn test_everything_failing_still_settles() {
    let sms = FakeSms {
        unavailable: true,
        ..FakeSms::default()
    };
    let links = FakeLinks {
        missing: vec!["whatsapp", "mailto"],
        ..FakeLinks::default()
    };
    let h = harness(
        FakeLocation::denied(),
        sms,
        links,
        DispatchConfig::default(),
    );
    let list = contacts(vec![contact(
        "Mother",
        Some("+923001111111"),
        Some("+923001111111"),
        Some("mother@example.org"),
    )]);

    let report = dispatched(h.engine.send_sos(&list).await);

    assert_eq!(report.attempts.len(), 3);
    assert_eq!(report.delivered(), 0);
    assert!(report.notice().unwrap().starts_with("SOS could not be sent"));
}
