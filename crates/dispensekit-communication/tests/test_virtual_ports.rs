//! Port enumeration against the host's real serial devices

use dispensekit_communication::list_ports;

#[test]
fn test_listed_ports_match_controller_patterns() {
    match list_ports() {
        Ok(ports) => {
            for port in &ports {
                let name = port.port_name.as_str();
                assert!(
                    name.starts_with("COM")
                        || name.starts_with("/dev/ttyUSB")
                        || name.starts_with("/dev/ttyACM")
                        || name.starts_with("/dev/cu.usb"),
                    "unexpected port in listing: {}",
                    name
                );
            }

            #[cfg(target_os = "linux")]
            {
                let acm0 = std::path::Path::new("/dev/ttyACM0");
                if acm0.exists() {
                    assert!(ports.iter().any(|p| p.port_name == "/dev/ttyACM0"));
                }
            }
        }
        // Enumeration is unsupported in some sandboxes
        Err(e) => assert!(e.is_connection_error(), "unexpected error: {}", e),
    }
}
