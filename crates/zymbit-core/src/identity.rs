//! Hardware-derived client id.
//!
//! The client id is the MAC address of the host's primary network
//! interface, read from `ip -o link show` (or `ifconfig -a` where iproute2
//! is missing). Container bridges, tunnels and loopback are skipped.
//! `CLIENT_ID` in the environment short-circuits the lookup entirely.
//!
//! [`ClientIdResolver`] computes the id at most once and keeps it for its
//! own lifetime; there is no process-wide global.

use std::fmt;
use std::process::Command;
use std::sync::{Arc, OnceLock};

use crate::error::CoreError;

/// Environment variable that overrides MAC-based resolution.
pub const CLIENT_ID_ENV: &str = "CLIENT_ID";

/// Interfaces tried first, in order.
const PREFERRED_INTERFACES: [&str; 2] = ["eth0", "en0"];

/// Name prefixes of loopback and virtual devices that never identify the host.
const IGNORED_PREFIXES: [&str; 17] = [
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "tun", "tap", "wg",
    // macOS
    "bridge", "awdl", "llw", "ap", "utun", "anpi", "gif",
];

/// Tokens that precede a hardware address in `ip`/`ifconfig` output.
const MAC_MARKERS: [&str; 4] = ["link/ether", "ether", "HWaddr", "lladdr"];

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse six hex octets separated by `:` or `-`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.to_lowercase().replace('-', ":");
        let octets: Vec<&str> = normalized.split(':').collect();
        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        valid.then_some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0' || c == ':')
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// A network interface with a hardware address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddress,
}

/// Where a client id came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    Interface(String),
    Environment,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interface(name) => write!(f, "interface {name}"),
            Self::Environment => write!(f, "${CLIENT_ID_ENV}"),
        }
    }
}

/// The resolved identity of this host. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// MAC address of the chosen interface, or the verbatim `CLIENT_ID`.
    pub client_id: String,
    pub resolved_from: IdentitySource,
}

// ── Listing sources ─────────────────────────────────────────────────

/// Produces the raw text of an interface listing.
pub trait InterfaceLister {
    fn list(&self) -> String;
}

/// Runs `ip -o link show`, falling back to `ifconfig -a`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLister;

impl SystemLister {
    fn run(program: &str, args: &[&str]) -> Option<String> {
        match Command::new(program).args(args).output() {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).into_owned();
                (!text.trim().is_empty()).then_some(text)
            }
            Ok(output) => {
                tracing::debug!(program, status = %output.status, "interface listing failed");
                None
            }
            Err(e) => {
                tracing::debug!(program, error = %e, "interface listing unavailable");
                None
            }
        }
    }
}

impl InterfaceLister for SystemLister {
    fn list(&self) -> String {
        Self::run("ip", &["-o", "link", "show"])
            .or_else(|| Self::run("ifconfig", &["-a"]))
            .unwrap_or_default()
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse interfaces out of `ip link` (one-line or multi-line) or
/// `ifconfig` (Linux net-tools, legacy `HWaddr`, BSD/macOS) output.
///
/// Returns interfaces in listing order; each name appears once.
pub fn parse_interfaces(listing: &str) -> Vec<Interface> {
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut current: Option<String> = None;

    for line in listing.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let rest = if line.starts_with(char::is_whitespace) {
            line
        } else {
            let (name, tail) = split_header(line);
            current = Some(name);
            tail
        };

        let Some(name) = current.as_ref() else {
            continue;
        };
        if interfaces.iter().any(|i| &i.name == name) {
            continue;
        }
        if let Some(mac) = find_mac(rest) {
            interfaces.push(Interface {
                name: name.clone(),
                mac,
            });
        }
    }

    interfaces
}

/// Split an interface header line into its name and the remainder.
///
/// Handles `2: eth0: <...>`, `eth0: flags=...`, `eth0      Link encap`,
/// and `veth12@if5:` forms.
fn split_header(line: &str) -> (String, &str) {
    let mut rest = line.trim_start();

    // iproute2 prefixes the interface index: "2: eth0: ..."
    if let Some((index, tail)) = rest.split_once(':') {
        if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
            rest = tail.trim_start();
        }
    }

    let end = rest
        .find(|c: char| c == ':' || c.is_whitespace())
        .unwrap_or(rest.len());
    let (raw_name, tail) = rest.split_at(end);
    let name = raw_name.split('@').next().unwrap_or(raw_name);

    (name.to_owned(), tail)
}

fn find_mac(text: &str) -> Option<MacAddress> {
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if MAC_MARKERS.contains(&token) {
            if let Some(mac) = tokens.next().and_then(MacAddress::parse) {
                return Some(mac);
            }
        }
    }
    None
}

fn is_ignored(iface: &Interface) -> bool {
    iface.mac.is_zero() || IGNORED_PREFIXES.iter().any(|p| iface.name.starts_with(p))
}

/// Pick the identifying interface: `eth0`, then `en0`, then the first
/// remaining candidate.
pub fn select_interface(interfaces: &[Interface]) -> Option<&Interface> {
    let candidates: Vec<&Interface> = interfaces.iter().filter(|i| !is_ignored(i)).collect();

    PREFERRED_INTERFACES
        .iter()
        .find_map(|pref| candidates.iter().find(|i| i.name == *pref).copied())
        .or_else(|| candidates.first().copied())
}

// ── Resolver ────────────────────────────────────────────────────────

/// Lazily resolves and caches the client id.
///
/// The cache is a `OnceLock`, so sharing a resolver across threads is
/// sound; concurrent first calls may each run the lister, and the first
/// result stored wins.
pub struct ClientIdResolver<L = SystemLister> {
    lister: L,
    env_override: Option<String>,
    cached: OnceLock<DeviceIdentity>,
}

impl ClientIdResolver<SystemLister> {
    /// Resolver over the real system, honoring `CLIENT_ID`.
    pub fn from_env() -> Self {
        Self::new(SystemLister, std::env::var(CLIENT_ID_ENV).ok())
    }
}

impl<L: InterfaceLister> ClientIdResolver<L> {
    /// `env_override` wins over the lister when it is non-empty.
    pub fn new(lister: L, env_override: Option<String>) -> Self {
        Self {
            lister,
            env_override: env_override.filter(|v| !v.trim().is_empty()),
            cached: OnceLock::new(),
        }
    }

    /// Resolve the client id, computing it on first use.
    pub fn get_client_id(&self) -> Result<DeviceIdentity, CoreError> {
        if let Some(identity) = self.cached.get() {
            return Ok(identity.clone());
        }

        let identity = self.resolve()?;
        tracing::debug!(client_id = %identity.client_id, source = %identity.resolved_from, "resolved client id");
        Ok(self.cached.get_or_init(|| identity).clone())
    }

    fn resolve(&self) -> Result<DeviceIdentity, CoreError> {
        if let Some(id) = &self.env_override {
            return Ok(DeviceIdentity {
                client_id: id.clone(),
                resolved_from: IdentitySource::Environment,
            });
        }

        let interfaces = parse_interfaces(&self.lister.list());
        let chosen = select_interface(&interfaces).ok_or(CoreError::NoInterfaceFound)?;

        Ok(DeviceIdentity {
            client_id: chosen.mac.to_string(),
            resolved_from: IdentitySource::Interface(chosen.name.clone()),
        })
    }
}

impl<L: InterfaceLister + Send + Sync + 'static> ClientIdResolver<L> {
    /// [`get_client_id`](Self::get_client_id) for async callers: the
    /// first lookup spawns `ip`/`ifconfig` on tokio's blocking pool.
    pub async fn get_client_id_async(self: Arc<Self>) -> Result<DeviceIdentity, CoreError> {
        if let Some(identity) = self.cached.get() {
            return Ok(identity.clone());
        }

        tokio::task::spawn_blocking(move || self.get_client_id())
            .await
            .map_err(|e| CoreError::Internal(format!("client id lookup failed: {e}")))?
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    const IP_ONELINE: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc pfifo_fast state UP mode DORMANT group default qlen 1000\\    link/ether b8:27:eb:00:00:02 brd ff:ff:ff:ff:ff:ff
3: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc pfifo_fast state UP mode DEFAULT group default qlen 1000\\    link/ether B8:27:EB:00:00:01 brd ff:ff:ff:ff:ff:ff
4: docker0: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue state DOWN mode DEFAULT group default \\    link/ether 02:42:ac:11:00:01 brd ff:ff:ff:ff:ff:ff
5: veth3f2a@if4: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue master docker0 state UP mode DEFAULT group default \\    link/ether 02:42:ac:11:00:02 brd ff:ff:ff:ff:ff:ff link-netnsid 0
";

    const IP_MULTILINE: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000
    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: enp3s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP mode DEFAULT group default qlen 1000
    link/ether 3c:7c:3f:aa:bb:cc brd ff:ff:ff:ff:ff:ff
";

    const IFCONFIG_MACOS: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\toptions=1203<RXCSUM,TXCSUM,TXSTATUS,SW_TIMESTAMP>
\tinet 127.0.0.1 netmask 0xff000000
bridge0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 36:a1:e2:00:00:10
en1: flags=8963<UP,BROADCAST,SMART,RUNNING,PROMISC,SIMPLEX,MULTICAST> mtu 1500
\tether 36:a1:e2:00:00:11
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\toptions=400<CHANNEL_IO>
\tether a4:83:e7:12:34:56
\tinet 192.168.1.20 netmask 0xffffff00 broadcast 192.168.1.255
";

    const IFCONFIG_LEGACY: &str = "\
docker0   Link encap:Ethernet  HWaddr 02:42:AC:11:00:01
          inet addr:172.17.0.1  Bcast:172.17.255.255  Mask:255.255.0.0

lo        Link encap:Local Loopback
          inet addr:127.0.0.1  Mask:255.0.0.0
";

    const IFCONFIG_NET_TOOLS: &str = "\
eth1: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500
        inet 10.0.0.5  netmask 255.255.255.0  broadcast 10.0.0.255
        ether 00:1a:2b:3c:4d:5e  txqueuelen 1000  (Ethernet)
";

    const IFCONFIG_MACOS_NO_EN0: &str = "\
bridge0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 36:a1:e2:00:00:10
ap1: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 36:a1:e2:00:00:12
awdl0: flags=8943<UP,BROADCAST,RUNNING,PROMISC,SIMPLEX,MULTICAST> mtu 1500
\tether 6e:a1:e2:00:00:13
llw0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 6e:a1:e2:00:00:13
anpi0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 36:a1:e2:00:00:14
en1: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:00:00:01
";

    /// Serves a fixed listing and counts how often it was asked.
    struct FakeLister {
        listing: &'static str,
        calls: AtomicUsize,
    }

    impl FakeLister {
        fn new(listing: &'static str) -> Self {
            Self {
                listing,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl InterfaceLister for &FakeLister {
        fn list(&self) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.listing.to_owned()
        }
    }

    #[test]
    fn mac_address_parsing() {
        assert_eq!(
            MacAddress::parse("AA-BB-CC-DD-EE-FF").unwrap().as_str(),
            "aa:bb:cc:dd:ee:ff"
        );
        assert!(MacAddress::parse("ff:ff:ff").is_none());
        assert!(MacAddress::parse("zz:bb:cc:dd:ee:ff").is_none());
        assert!(MacAddress::parse("00:00:00:00:00:00").unwrap().is_zero());
    }

    #[test]
    fn parses_ip_oneline_listing() {
        let names: Vec<String> = parse_interfaces(IP_ONELINE)
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["wlan0", "eth0", "docker0", "veth3f2a"]);
    }

    #[test]
    fn parses_ip_multiline_listing() {
        let ifaces = parse_interfaces(IP_MULTILINE);
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].name, "enp3s0");
        assert_eq!(ifaces[0].mac.as_str(), "3c:7c:3f:aa:bb:cc");
    }

    #[test]
    fn parses_net_tools_ifconfig() {
        let ifaces = parse_interfaces(IFCONFIG_NET_TOOLS);
        assert_eq!(ifaces[0].name, "eth1");
        assert_eq!(ifaces[0].mac.as_str(), "00:1a:2b:3c:4d:5e");
    }

    #[test]
    fn eth0_is_preferred_over_earlier_interfaces() {
        let ifaces = parse_interfaces(IP_ONELINE);
        let chosen = select_interface(&ifaces).unwrap();
        assert_eq!(chosen.name, "eth0");
        assert_eq!(chosen.mac.as_str(), "b8:27:eb:00:00:01");
    }

    #[test]
    fn en0_is_preferred_when_eth0_is_absent() {
        let ifaces = parse_interfaces(IFCONFIG_MACOS);
        let chosen = select_interface(&ifaces).unwrap();
        assert_eq!(chosen.name, "en0");
    }

    #[test]
    fn macos_virtual_devices_are_skipped() {
        let ifaces = parse_interfaces(IFCONFIG_MACOS_NO_EN0);
        assert_eq!(ifaces.len(), 6);
        let chosen = select_interface(&ifaces).unwrap();
        assert_eq!(chosen.name, "en1");
        assert_eq!(chosen.mac.as_str(), "a4:83:e7:00:00:01");
    }

    #[test]
    fn first_candidate_when_no_preferred_interface() {
        let ifaces = parse_interfaces(IP_MULTILINE);
        assert_eq!(select_interface(&ifaces).unwrap().name, "enp3s0");
    }

    #[test]
    fn only_ignored_devices_is_no_interface_found() {
        let lister = FakeLister::new(IFCONFIG_LEGACY);
        let resolver = ClientIdResolver::new(&lister, None);
        assert!(matches!(
            resolver.get_client_id(),
            Err(CoreError::NoInterfaceFound)
        ));
    }

    #[test]
    fn empty_listing_is_no_interface_found() {
        let lister = FakeLister::new("");
        let resolver = ClientIdResolver::new(&lister, None);
        assert!(matches!(
            resolver.get_client_id(),
            Err(CoreError::NoInterfaceFound)
        ));
    }

    #[test]
    fn env_override_skips_listing() {
        let lister = FakeLister::new(IP_ONELINE);
        let resolver = ClientIdResolver::new(&lister, Some("My-Custom-ID".into()));

        let identity = resolver.get_client_id().unwrap();
        assert_eq!(identity.client_id, "My-Custom-ID");
        assert_eq!(identity.resolved_from, IdentitySource::Environment);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blank_env_override_is_ignored() {
        let lister = FakeLister::new(IP_ONELINE);
        let resolver = ClientIdResolver::new(&lister, Some("  ".into()));
        assert_eq!(
            resolver.get_client_id().unwrap().resolved_from,
            IdentitySource::Interface("eth0".into())
        );
    }

    #[test]
    fn result_is_cached_after_first_call() {
        let lister = FakeLister::new(IP_ONELINE);
        let resolver = ClientIdResolver::new(&lister, None);

        let first = resolver.get_client_id().unwrap();
        let second = resolver.get_client_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
    }

    /// Records the thread each listing ran on.
    #[derive(Default)]
    struct ThreadLister(std::sync::Mutex<Vec<std::thread::ThreadId>>);

    impl InterfaceLister for ThreadLister {
        fn list(&self) -> String {
            self.0.lock().unwrap().push(std::thread::current().id());
            IP_ONELINE.to_owned()
        }
    }

    #[tokio::test]
    async fn async_lookup_lists_off_the_runtime_thread() {
        let resolver = Arc::new(ClientIdResolver::new(ThreadLister::default(), None));

        let first = Arc::clone(&resolver).get_client_id_async().await.unwrap();
        let second = Arc::clone(&resolver).get_client_id_async().await.unwrap();

        assert_eq!(first.client_id, "b8:27:eb:00:00:01");
        assert_eq!(first, second);
        let threads = resolver.lister.0.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }
}
