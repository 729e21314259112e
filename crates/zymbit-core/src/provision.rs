// ── Device provisioning ──
//
// Turns a provisioning token into a persisted config. Unless the caller
// asks for a config-only run, the token is confirmed with the control
// plane first; the file is written only after the server accepted it.

use std::fmt;

use zymbit_config::{ConfigStore, ProvisionConfig};

use crate::error::CoreError;
use crate::remote::Registrar;

/// Arguments of a single provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub token: String,
    pub api_url: Option<String>,
    pub websocket_url: Option<String>,
    /// `false` disables TLS hostname verification.
    pub check_hostname: bool,
    /// Write the config without contacting the server.
    pub config_only: bool,
    /// Remove any existing config before provisioning.
    pub clean: bool,
}

impl ProvisionRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: None,
            websocket_url: None,
            check_hostname: true,
            config_only: false,
            clean: false,
        }
    }

    /// The config this request would persist.
    pub fn to_config(&self) -> ProvisionConfig {
        ProvisionConfig::new(
            self.token.clone(),
            self.api_url.clone(),
            self.websocket_url.clone(),
            self.check_hostname,
        )
    }
}

/// How a successful provisioning run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Config written, server not contacted.
    ConfigOnly,
    /// The server confirmed the registration.
    Confirmed,
    /// The registration was already used, but the token still works.
    AlreadyConfirmed,
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigOnly => write!(f, "configuration written (server not contacted)"),
            Self::Confirmed => write!(f, "registration confirmed"),
            Self::AlreadyConfirmed => write!(f, "device already registered"),
        }
    }
}

/// Runs provisioning against a [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct ProvisionProcess {
    store: ConfigStore,
}

impl ProvisionProcess {
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Provision the device.
    ///
    /// `connect` builds the registrar from the config about to be written;
    /// it is not called for config-only runs. A confirmation that fails
    /// with 404 falls back to listing devices: if the token can list them,
    /// the device is treated as already registered. Any other failure
    /// leaves the store untouched (apart from `clean`).
    pub async fn run<R, F>(
        &self,
        request: &ProvisionRequest,
        connect: F,
    ) -> Result<ProvisionOutcome, CoreError>
    where
        R: Registrar,
        F: FnOnce(&ProvisionConfig) -> Result<R, CoreError>,
    {
        let config = request.to_config();
        config.validate()?;

        if request.clean && self.store.remove()? {
            tracing::info!(path = %self.store.path().display(), "removed previous config");
        }

        if request.config_only {
            self.store.save(&config)?;
            return Ok(ProvisionOutcome::ConfigOnly);
        }

        let registrar = connect(&config)?;
        let outcome = Self::confirm(&registrar, &config.token).await?;

        self.store.save(&config)?;
        Ok(outcome)
    }

    async fn confirm<R: Registrar>(
        registrar: &R,
        token: &str,
    ) -> Result<ProvisionOutcome, CoreError> {
        match registrar.confirm_registration(token).await {
            Ok(()) => Ok(ProvisionOutcome::Confirmed),
            Err(e) if e.is_not_found() => {
                tracing::debug!("registration not found, checking whether token is already active");
                match registrar.list_devices().await {
                    Ok(devices) => {
                        tracing::info!(devices = devices.len(), "token already active");
                        Ok(ProvisionOutcome::AlreadyConfirmed)
                    }
                    Err(list_err) => {
                        tracing::debug!(error = %list_err, "device listing failed after 404");
                        Err(e.into())
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use zymbit_api::{DeviceRecord, Error};

    use super::*;
    use crate::remote::DeviceDirectory;

    /// Scripted registrar that records calls.
    struct FakeRegistrar {
        confirm_status: Option<u16>,
        list_status: Option<u16>,
        confirmed: Mutex<Vec<String>>,
        listed: AtomicUsize,
    }

    impl FakeRegistrar {
        fn new(confirm_status: Option<u16>, list_status: Option<u16>) -> Self {
            Self {
                confirm_status,
                list_status,
                confirmed: Mutex::new(Vec::new()),
                listed: AtomicUsize::new(0),
            }
        }
    }

    fn api_error(status: u16) -> Error {
        Error::Api {
            status,
            message: format!("HTTP {status}"),
            body: serde_json::Value::Null,
        }
    }

    impl DeviceDirectory for &FakeRegistrar {
        async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
            self.listed.fetch_add(1, Ordering::SeqCst);
            match self.list_status {
                Some(status) => Err(api_error(status)),
                None => Ok(Vec::new()),
            }
        }
    }

    impl Registrar for &FakeRegistrar {
        async fn confirm_registration(&self, code: &str) -> Result<(), Error> {
            self.confirmed.lock().unwrap().push(code.to_owned());
            match self.confirm_status {
                Some(status) => Err(api_error(status)),
                None => Ok(()),
            }
        }
    }

    fn process() -> (tempfile::TempDir, ProvisionProcess) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"));
        (dir, ProvisionProcess::new(store))
    }

    #[tokio::test]
    async fn confirmed_registration_writes_config() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(None, None);
        let mut request = ProvisionRequest::new("ABC123");
        request.api_url = Some("http://localhost:8000/api".into());

        let outcome = process.run(&request, |_| Ok(&fake)).await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::Confirmed);
        assert_eq!(*fake.confirmed.lock().unwrap(), ["ABC123"]);
        let saved = process.store().load().unwrap();
        assert_eq!(saved.token, "ABC123");
        assert_eq!(saved.api_url, "http://localhost:8000/api");
    }

    #[tokio::test]
    async fn config_only_never_connects() {
        let (_dir, process) = process();
        let mut request = ProvisionRequest::new("ABC123");
        request.config_only = true;
        request.check_hostname = false;

        let outcome = process
            .run::<&FakeRegistrar, _>(&request, |_| {
                panic!("config-only run must not build a registrar")
            })
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::ConfigOnly);
        assert!(!process.store().load().unwrap().verify_tls);
    }

    #[tokio::test]
    async fn clean_config_only_writes_exactly_the_arguments() {
        let (_dir, process) = process();
        process
            .store()
            .save(&ProvisionConfig::new("OLD", Some("http://old.test/".into()), None, false))
            .unwrap();
        let fake = FakeRegistrar::new(None, None);
        let request = ProvisionRequest {
            token: "NEW".into(),
            api_url: Some("http://api.test/v2".into()),
            websocket_url: Some("ws://ws.test/".into()),
            check_hostname: true,
            config_only: true,
            clean: true,
        };

        process.run(&request, |_| Ok(&fake)).await.unwrap();

        assert_eq!(process.store().load().unwrap(), request.to_config());
        assert!(fake.confirmed.lock().unwrap().is_empty());
        assert_eq!(fake.listed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_found_with_working_token_is_already_confirmed() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(Some(404), None);

        let outcome = process
            .run(&ProvisionRequest::new("ABC123"), |_| Ok(&fake))
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyConfirmed);
        assert_eq!(fake.listed.load(Ordering::SeqCst), 1);
        assert!(process.store().exists());
    }

    #[tokio::test]
    async fn not_found_with_rejected_token_fails_without_saving() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(Some(404), Some(401));

        let err = process
            .run(&ProvisionRequest::new("ABC123"), |_| Ok(&fake))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(!process.store().exists());
    }

    #[tokio::test]
    async fn server_error_is_fatal_and_skips_fallback() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(Some(500), None);

        let err = process
            .run(&ProvisionRequest::new("ABC123"), |_| Ok(&fake))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(fake.listed.load(Ordering::SeqCst), 0);
        assert!(!process.store().exists());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failure() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(Some(401), None);

        let err = process
            .run(&ProvisionRequest::new("ABC123"), |_| Ok(&fake))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn clean_removes_existing_config_first() {
        let (_dir, process) = process();
        process
            .store()
            .save(&ProvisionConfig::new("OLD", None, None, true))
            .unwrap();
        let fake = FakeRegistrar::new(Some(500), None);
        let mut request = ProvisionRequest::new("NEW");
        request.clean = true;

        let _ = process.run(&request, |_| Ok(&fake)).await;

        assert!(!process.store().exists());
    }

    #[tokio::test]
    async fn invalid_url_fails_before_connecting() {
        let (_dir, process) = process();
        let fake = FakeRegistrar::new(None, None);
        let mut request = ProvisionRequest::new("ABC123");
        request.api_url = Some("not a url".into());

        let err = process
            .run(&request, |_| Ok(&fake))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Config { .. }));
        assert!(fake.confirmed.lock().unwrap().is_empty());
    }
}
