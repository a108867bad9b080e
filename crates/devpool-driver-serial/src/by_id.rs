//! Parsing of `/dev/serial/by-id` link names.
//!
//! Linux udev creates stable symlinks with the format:
//! ```text
//! usb-{VENDOR}_{MODEL}_{SERIAL}-if{INTERFACE}-port{PORT}
//! ```
//!
//! Examples:
//! - `usb-FTDI_FT230X_Basic_UART_DJ00XXXX-if00-port0` (FTDI chip)
//! - `usb-Silicon_Labs_CP2102_USB_to_UART_Bridge_0001-if00-port0` (CP2102)

use devpool_core::DeviceId;

/// Components of a by-id link name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByIdName {
    /// Text before the first underscore (e.g., "FTDI")
    pub vendor: String,
    /// Text between vendor and serial (may be empty)
    pub model: String,
    /// Text after the last underscore
    pub serial: String,
    /// USB interface number as written (e.g., "00")
    pub interface: String,
    /// Port number on that interface as written (e.g., "0")
    pub port: String,
}

impl ByIdName {
    /// Parse a link name; returns `None` for anything that is not a USB by-id name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix("usb-")?;

        let (body, suffix) = name.rsplit_once("-if")?;
        let (interface, port) = suffix.split_once("-port")?;
        if interface.is_empty() || port.is_empty() {
            return None;
        }

        let (vendor, rest) = body.split_once('_')?;
        let (model, serial) = match rest.rsplit_once('_') {
            Some((model, serial)) => (model, serial),
            None => ("", rest),
        };
        if vendor.is_empty() || serial.is_empty() {
            return None;
        }

        Some(Self {
            vendor: vendor.to_string(),
            model: model.to_string(),
            serial: serial.to_string(),
            interface: interface.to_string(),
            port: port.to_string(),
        })
    }

    /// Device identifier: the serial number, qualified with interface and
    /// port for every link but the first of a multi-port adapter.
    pub fn device_id(&self) -> DeviceId {
        if self.is_primary() {
            self.serial.clone()
        } else {
            format!("{}-if{}-port{}", self.serial, self.interface, self.port)
        }
    }

    /// Device type: vendor and model joined with an underscore.
    pub fn device_type(&self) -> String {
        if self.model.is_empty() {
            self.vendor.clone()
        } else {
            format!("{}_{}", self.vendor, self.model)
        }
    }

    fn is_primary(&self) -> bool {
        self.interface.chars().all(|c| c == '0') && self.port.chars().all(|c| c == '0')
    }
}
