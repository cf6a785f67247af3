//! Default gateway discovery.
//!
//! `pnet` reports addresses and flags for each device but not its routes, so
//! the gateway comes from the operating system's routing table.

use std::net::Ipv4Addr;

use pnet::datalink::NetworkInterface;

const RTF_UP: u32 = 0x0001;
const RTF_GATEWAY: u32 = 0x0002;

/// Returns the IPv4 default gateway routed through `interface`, if any.
pub fn default_gateway(interface: &NetworkInterface) -> Option<Ipv4Addr> {
    platform_gateway(&interface.name)
}

#[cfg(target_os = "linux")]
fn platform_gateway(name: &str) -> Option<Ipv4Addr> {
    let table = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_route_table(&table, name)
}

#[cfg(target_os = "macos")]
fn platform_gateway(name: &str) -> Option<Ipv4Addr> {
    let output = std::process::Command::new("route")
        .args(["-n", "get", "default"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_route_get(&String::from_utf8_lossy(&output.stdout), name)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_gateway(_name: &str) -> Option<Ipv4Addr> {
    None
}

/// Parses the contents of `/proc/net/route`.
///
/// Addresses are stored as host-order hex, i.e. little-endian on every
/// platform Linux runs this on.
pub fn parse_route_table(table: &str, name: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (iface, destination, gateway, flags) =
            (fields.first()?, fields.get(1)?, fields.get(2)?, fields.get(3)?);
        if *iface != name || *destination != "00000000" {
            return None;
        }
        let flags = u32::from_str_radix(flags, 16).ok()?;
        if flags & (RTF_UP | RTF_GATEWAY) != (RTF_UP | RTF_GATEWAY) {
            return None;
        }
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}

/// Parses the output of `route -n get default`.
pub fn parse_route_get(output: &str, name: &str) -> Option<Ipv4Addr> {
    let mut gateway: Option<Ipv4Addr> = None;
    let mut interface: Option<&str> = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "gateway" => gateway = value.trim().parse().ok(),
            "interface" => interface = Some(value.trim()),
            _ => {}
        }
    }
    if interface? != name {
        return None;
    }
    gateway
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0001A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
wlan0\t00000000\t010A0A0A\t0003\t0\t0\t600\t00000000\t0\t0\t0
";

    #[test]
    fn route_table_default_entry_is_decoded() {
        assert_eq!(
            parse_route_table(ROUTE_TABLE, "eth0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(
            parse_route_table(ROUTE_TABLE, "wlan0"),
            Some(Ipv4Addr::new(10, 10, 10, 1))
        );
    }

    #[test]
    fn route_table_without_default_route_yields_none() {
        assert_eq!(parse_route_table(ROUTE_TABLE, "eth1"), None);
        let only_local = ROUTE_TABLE.lines().take(2).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_route_table(&only_local, "eth0"), None);
    }

    #[test]
    fn route_get_output_is_decoded() {
        let output = "   route to: default\ndestination: default\n       mask: default\n    gateway: 192.168.0.1\n  interface: en0\n      flags: <UP,GATEWAY,DONE,STATIC,PRCLONING>\n";
        assert_eq!(parse_route_get(output, "en0"), Some(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(parse_route_get(output, "en1"), None);
    }
}
