//! Bridges from `shutter_config` types to `shutter_core` and `shutter_traits` types.

use std::time::Duration;

use shutter_traits::{BusKind, ShutterAddress};

use crate::config::ShutterRun;

// ── ShutterRun ───────────────────────────────────────────────────────────────

impl From<shutter_config::RunSetting> for ShutterRun {
    fn from(s: shutter_config::RunSetting) -> Self {
        match s {
            shutter_config::RunSetting::Auto => ShutterRun::Undefined,
            shutter_config::RunSetting::Millis(ms) => ShutterRun::from_ms(ms),
        }
    }
}

// ── Addressing ───────────────────────────────────────────────────────────────

/// Bus kind from the TOML enum.
pub fn bus_kind(b: shutter_config::BusCfg) -> BusKind {
    match b {
        shutter_config::BusCfg::Zigbee => BusKind::Zigbee,
        shutter_config::BusCfg::PointToPoint => BusKind::PointToPoint,
    }
}

/// Shutter address from the `[shutter]` section; the id is trimmed.
pub fn address(s: &shutter_config::ShutterSection) -> ShutterAddress {
    ShutterAddress::new(s.address.trim(), bus_kind(s.bus))
}

/// Minimum step from the TOML section.
pub fn min_step(s: &shutter_config::ShutterSection) -> Duration {
    Duration::from_millis(s.min_step_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_maps_to_wire_address() {
        let cfg = shutter_config::load_toml(
            "[shutter]\naddress = \" 12 \"\nbus = \"point-to-point\"\nmin_step_ms = 80\n",
        )
        .unwrap();
        let addr = address(&cfg.shutter);
        assert_eq!(addr, ShutterAddress::new("12", BusKind::PointToPoint));
        assert_eq!(addr.to_string(), "12");
        assert_eq!(min_step(&cfg.shutter), Duration::from_millis(80));

        let zb = shutter_config::load_toml("[shutter]\naddress = \"765432101\"\n").unwrap();
        assert_eq!(address(&zb.shutter).to_string(), "765432101#9");
    }
}
