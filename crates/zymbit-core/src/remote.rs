// ── Seams over the control-plane API ──
//
// Provisioning and the tunnel launcher only need two calls. Keeping them
// behind traits lets tests count invocations without an HTTP server.

use std::future::Future;

use zymbit_api::{ApiClient, DeviceRecord, Error};

/// Read access to the account's device list.
pub trait DeviceDirectory {
    fn list_devices(&self) -> impl Future<Output = Result<Vec<DeviceRecord>, Error>> + Send;
}

/// Registration confirmation on top of the device list.
pub trait Registrar: DeviceDirectory {
    fn confirm_registration(&self, code: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

impl DeviceDirectory for ApiClient {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        ApiClient::list_devices(self).await
    }
}

impl Registrar for ApiClient {
    async fn confirm_registration(&self, code: &str) -> Result<(), Error> {
        ApiClient::confirm_registration(self, code).await.map(|_| ())
    }
}
