//! Idle-time and network probes.
//!
//! Both read the output of standard system commands. Parsing is kept
//! separate from command execution so it can be tested against captured
//! output.

use regex::Regex;
use std::net::Ipv4Addr;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// Auto-installs without a GUI session need more idle time than this.
pub const IDLE_THRESHOLD_SECS: u64 = 10;

const NANOS_PER_SEC: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Idle time
// ---------------------------------------------------------------------------

/// Convert the HID idle counter (nanoseconds) to whole seconds, truncating.
pub fn idle_seconds(raw_ns: u64) -> u64 {
    raw_ns / NANOS_PER_SEC
}

fn hid_idle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""?HIDIdleTime"?\s*=\s*(\d+)"#).expect("valid HIDIdleTime regex")
    })
}

/// Extract the raw `HIDIdleTime` counter from `ioreg -c IOHIDSystem` output.
pub fn parse_hid_idle_time(ioreg_output: &str) -> Option<u64> {
    hid_idle_re()
        .captures(ioreg_output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sample the current idle time. Returns 0 when the counter is unavailable.
pub fn sample_idle_seconds() -> u64 {
    let Some(output) = run_capture("ioreg", &["-c", "IOHIDSystem", "-d", "4"]) else {
        return 0;
    };
    parse_hid_idle_time(&output).map(idle_seconds).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Collect IPv4 addresses from `ifconfig` or `ip -o -4 addr show` output.
///
/// Handles `inet 10.0.0.5 netmask ...`, `inet 10.0.0.5/24 brd ...` and the
/// older `inet addr:10.0.0.5` form.
pub fn parse_inet_addresses(output: &str) -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token != "inet" {
                continue;
            }
            let Some(raw) = tokens.next() else {
                break;
            };
            let raw = raw.trim_start_matches("addr:");
            let raw = raw.split('/').next().unwrap_or(raw);
            if let Ok(addr) = raw.parse::<Ipv4Addr>() {
                addrs.push(addr);
            }
        }
    }
    addrs
}

/// True if any address is usable for reaching the network.
pub fn has_routable_address(addrs: &[Ipv4Addr]) -> bool {
    addrs
        .iter()
        .any(|a| !a.is_loopback() && !a.is_unspecified())
}

/// True if some active non-loopback interface holds an address.
pub fn network_up() -> bool {
    let output = run_capture("ifconfig", &["-a", "inet"])
        .or_else(|| run_capture("ip", &["-o", "-4", "addr", "show"]));
    match output {
        Some(out) => has_routable_address(&parse_inet_addresses(&out)),
        None => {
            tracing::debug!("neither ifconfig nor ip is available");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn run_capture(program: &str, args: &[&str]) -> Option<String> {
    let path = which::which(program).ok()?;
    let output = Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOREG_SAMPLE: &str = r#"
+-o IOHIDSystem  <class IOHIDSystem, id 0x100000429, registered, matched, active>
    {
      "HIDIdleTime" = 9500000000
      "HIDParameters" = {"HIDMouseAcceleration"=45056}
    }
"#;

    #[test]
    fn idle_seconds_truncates() {
        assert_eq!(idle_seconds(9_500_000_000), 9);
        assert_eq!(idle_seconds(999_999_999), 0);
        assert_eq!(idle_seconds(10_000_000_000), 10);
    }

    #[test]
    fn parses_hid_idle_time() {
        assert_eq!(parse_hid_idle_time(IOREG_SAMPLE), Some(9_500_000_000));
        assert_eq!(parse_hid_idle_time(IOREG_SAMPLE).map(idle_seconds), Some(9));
        assert_eq!(parse_hid_idle_time("no counter here"), None);
    }

    #[test]
    fn parses_unquoted_hid_idle_time() {
        assert_eq!(parse_hid_idle_time("  HIDIdleTime = 42000000000\n"), Some(42_000_000_000));
    }

    #[test]
    fn parses_ifconfig_output() {
        let out = "lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384\n\
                   \tinet 127.0.0.1 netmask 0xff000000\n\
                   en0: flags=8863<UP,BROADCAST,SMART,RUNNING> mtu 1500\n\
                   \tinet 192.168.1.20 netmask 0xffffff00 broadcast 192.168.1.255\n";
        let addrs = parse_inet_addresses(out);
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(127, 0, 0, 1),
                Ipv4Addr::new(192, 168, 1, 20)
            ]
        );
        assert!(has_routable_address(&addrs));
    }

    #[test]
    fn parses_ip_addr_output() {
        let out = "1: lo    inet 127.0.0.1/8 scope host lo\n\
                   2: eth0    inet 10.0.3.7/24 brd 10.0.3.255 scope global eth0\n";
        assert_eq!(
            parse_inet_addresses(out),
            vec![Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(10, 0, 3, 7)]
        );
    }

    #[test]
    fn loopback_and_unspecified_do_not_count() {
        let out = "\tinet 127.0.0.1 netmask 0xff000000\n\tinet addr:0.0.0.0\n";
        let addrs = parse_inet_addresses(out);
        assert_eq!(addrs.len(), 2);
        assert!(!has_routable_address(&addrs));
        assert!(!has_routable_address(&[]));
    }
}
