use colored::*;
use is_root::is_root;
use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;
use tcproute_common::network::gateway;
use tcproute_common::network::interface;

use crate::terminal::colors;
use crate::terminal::print::{self, GLOBAL_KEY_WIDTH};

type Detail = (String, ColoredString);

pub fn info() -> anyhow::Result<()> {
    print::print(&format!(
        "{}",
        "tcproute traces the path to a TCP service using SYN probes.".color(colors::TEXT_DEFAULT)
    ));
    print::print("");
    GLOBAL_KEY_WIDTH.set(10);

    print::aligned_line("Version", env!("CARGO_PKG_VERSION"));
    print::aligned_line("License", "MIT");
    let privileges = if is_root() {
        "root".green().bold()
    } else {
        "unprivileged (run as root to trace)".yellow()
    };
    print::aligned_line("Privileges", privileges);

    print_interfaces(&interface::usable_interfaces());
    print::end_of_program();
    Ok(())
}

fn print_interfaces(interfaces: &[NetworkInterface]) {
    print::header("network interfaces");
    if interfaces.is_empty() {
        print::print_status("No usable devices found");
        return;
    }

    for (idx, intf) in interfaces.iter().enumerate() {
        print::tree_head(intf.index as usize, &intf.name);
        print::as_tree_one_level(interface_details(intf));
        if idx + 1 != interfaces.len() {
            print::print("");
        }
    }
}

fn interface_details(intf: &NetworkInterface) -> Vec<Detail> {
    let mut details: Vec<Detail> = intf
        .ips
        .iter()
        .filter_map(|ip| match ip {
            IpNetwork::V4(net) => Some(("IPv4".to_string(), net.to_string().color(colors::IPV4_ADDR))),
            IpNetwork::V6(_) => None,
        })
        .collect();

    if let Some(mac) = intf.mac {
        details.push(("MAC".to_string(), mac.to_string().color(colors::MAC_ADDR)));
    }

    let gateway = match gateway::default_gateway(intf) {
        Some(addr) => addr.to_string().color(colors::IPV4_ADDR),
        None => "none".color(colors::UNRESOLVED),
    };
    details.push(("Gateway".to_string(), gateway));
    details
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
