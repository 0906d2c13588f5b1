//! Maps `Box<dyn Error>` from the gateway boundary to a typed `ShutterError`.
//!
//! With the `hardware-errors` feature, `shutter_hardware::error::HwError` is
//! downcast for a precise mapping; otherwise only the message is inspected.

use crate::error::ShutterError;

pub fn map_gateway_error(e: &(dyn std::error::Error + 'static)) -> ShutterError {
    #[cfg(feature = "hardware-errors")]
    {
        use shutter_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::AckTimeout => ShutterError::Timeout,
                other => ShutterError::Gateway(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ShutterError::Timeout
    } else {
        ShutterError::Gateway(s)
    }
}
