//! Flash table and port listing command implementations.

use {
    anyhow::Result,
    btbridge::{FLASH_TABLE, FlashParams, NativePortEnumerator, PortEnumerator, PortInfo},
    console::style,
};

fn flash_json(params: &FlashParams) -> serde_json::Value {
    serde_json::json!({
        "id": format!("{:#08x}", params.id),
        "name": params.name,
        "capacity": params.capacity,
        "status_registers": params.sr_count,
        "bp_offset": params.bp_offset,
        "bp_width": params.bp_width,
        "protect_bits": params.protect_bits,
        "unprotect_bits": params.unprotect_bits,
        "verify_write": params.verify_write,
    })
}

/// Print the supported flash parts.
pub(crate) fn cmd_flash_table(json: bool) -> Result<()> {
    if json {
        let parts: Vec<serde_json::Value> = FLASH_TABLE.iter().map(flash_json).collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "flash": parts,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{:<10} {:<12} {:>9} {:>3}  {:<9} {:<9}",
        "ID", "PART", "SIZE", "SR", "PROTECT", "UNPROTECT"
    );
    for part in FLASH_TABLE {
        println!(
            "{:<10} {:<12} {:>7}K {:>3}  {:<#9x} {:<#9x}",
            format!("{:#08x}", part.id),
            part.name,
            part.capacity / 1024,
            part.sr_count,
            part.protect_bits,
            part.unprotect_bits,
        );
    }
    Ok(())
}

fn port_json(port: &PortInfo) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    // A host without serial support reports no ports rather than failing.
    let detected = NativePortEnumerator::list_ports().unwrap_or_else(|e| {
        log::debug!("port enumeration failed: {e}");
        Vec::new()
    });

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("(none found)").dim());
        return Ok(());
    }

    for port in &detected {
        let product = port.product.as_deref().unwrap_or("");
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        eprintln!(
            "  {} {}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            vid_pid,
            if !product.is_empty() {
                format!(" - {}", style(product).dim())
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_json_fields() {
        let part = &FLASH_TABLE[0];
        let value = flash_json(part);
        assert_eq!(value["name"], part.name);
        assert_eq!(value["capacity"], part.capacity);
        assert!(value["id"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn test_port_json_fields() {
        let port = PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            vid: Some(0x10C4),
            pid: Some(0xEA60),
            manufacturer: None,
            product: Some("CP2102".to_string()),
        };
        let value = port_json(&port);
        assert_eq!(value["name"], "/dev/ttyUSB0");
        assert_eq!(value["vid"], 0x10C4);
        assert!(value["manufacturer"].is_null());
    }
}
