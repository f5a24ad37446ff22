use super::{netmask_prefix, InterfaceAddress, NetworkError, SysNetworking};
use std::net::Ipv4Addr;
use std::process::Command;

/// Linux networking through `ip`, `dhclient` and `hostnamectl`
#[derive(Debug, Default)]
pub struct LinuxNetworking {
    interface: Option<String>,
}

impl LinuxNetworking {
    pub fn new() -> Self {
        Self::default()
    }

    fn interface(&self) -> Result<&str, NetworkError> {
        self.interface.as_deref().ok_or(NetworkError::NoInterface)
    }
}

fn run(program: &str, args: &[&str]) -> Result<String, NetworkError> {
    let command = format!("{} {}", program, args.join(" "));
    log::debug!("Running `{}`", command);

    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        return Err(NetworkError::CommandFailed {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `ip -o -4 addr show` output
pub fn parse_ip_addr(output: &str) -> Vec<InterfaceAddress> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _index = fields.next()?;
            let name = fields.next()?.trim_end_matches(':');
            if fields.next()? != "inet" {
                return None;
            }
            let (address, prefix) = fields.next()?.split_once('/')?;
            Some(InterfaceAddress {
                name: name.to_string(),
                address: address.parse::<Ipv4Addr>().ok()?,
                prefix_len: prefix.parse().ok()?,
            })
        })
        .collect()
}

impl SysNetworking for LinuxNetworking {
    fn interfaces(&self) -> Result<Vec<InterfaceAddress>, NetworkError> {
        let output = run("ip", &["-o", "-4", "addr", "show"])?;
        Ok(parse_ip_addr(&output))
    }

    fn select_interface(&mut self, interface: &InterfaceAddress) {
        self.interface = Some(interface.name.clone());
    }

    fn set_static(
        &mut self,
        ip: &str,
        netmask: &str,
        gateway: &str,
        broadcast: &str,
    ) -> Result<(), NetworkError> {
        let interface = self.interface()?;
        let address = format!("{}/{}", ip, netmask_prefix(netmask)?);

        if let Err(e) = run("dhclient", &["-r", interface]) {
            log::debug!("No DHCP lease to release on {}: {}", interface, e);
        }
        run("ip", &["addr", "flush", "dev", interface])?;
        run(
            "ip",
            &["addr", "add", &address, "broadcast", broadcast, "dev", interface],
        )?;
        run(
            "ip",
            &["route", "replace", "default", "via", gateway, "dev", interface],
        )?;
        log::info!("Set {} to static {} via {}", interface, address, gateway);
        Ok(())
    }

    fn set_dhcp(&mut self) -> Result<(), NetworkError> {
        let interface = self.interface()?;
        run("ip", &["addr", "flush", "dev", interface])?;
        run("dhclient", &[interface])?;
        log::info!("Set {} to DHCP", interface);
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<(), NetworkError> {
        run("hostnamectl", &["set-hostname", hostname])?;
        log::info!("Hostname set to {}", hostname);
        Ok(())
    }
}
