//! The closed catalog of file categories and the order they are dispatched in.
//!
//! Most categories are recognized by the suffix that follows the
//! `kplr<timestamp>` prefix (see [`crate::filename`]). A few reference-data
//! categories do not carry the timestamp prefix and are matched on the whole
//! filename instead, and a few are never recognized per file at all: the
//! notification message's own suffix routes every listed file to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Notification-message suffixes a watcher picks up by default.
pub const MANIFEST_SUFFIXES: &[&str] = &[
    "_sdnm.xml",
    "_grnm.xml",
    "_senm.xml",
    "_tlnm.xml",
    "_tlsnm.xml",
    "_mtnm.xml",
    "_rclcnm.xml",
    "_uinm.xml",
];

/// A file category with its own dispatcher.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatcherType {
    ConfigMap,
    SpacecraftEphemeris,
    PlanetaryEphemeris,
    LeapSeconds,
    Sclk,
    RefPixel,
    Crct,
    Ffi,
    History,
    ClockStateMask,
    TargetList,
    TargetListSet,
    MaskTable,
    LongCadenceTargetPmrf,
    ShortCadenceTargetPmrf,
    BackgroundPmrf,
    LongCadenceCollateralPmrf,
    ShortCadenceCollateralPmrf,
    GapReport,
    Histogram,
    Ancillary,
    ThrusterData,
    DataAnomaly,
    LongCadencePixel,
    ShortCadencePixel,
    RclcPixel,
    UkirtImage,
}

/// How files of a [`DispatcherType`] are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognition {
    /// Exact match on the suffix following the timestamp prefix, separator included.
    Suffixes(&'static [&'static str]),
    /// Whole-filename match for files outside the naming convention.
    FileName {
        prefix: &'static str,
        suffix: &'static str,
    },
    /// The notification message suffix selects this type for every listed file.
    Manifest(&'static str),
}

/// Dispatch order used whenever several categories arrive in one message.
///
/// Earlier categories produce reference data the later ones read.
pub const DISPATCHER_ORDERING: &[DispatcherType] = &[
    // Reference data the quality pipeline needs first.
    DispatcherType::ConfigMap,
    DispatcherType::SpacecraftEphemeris,
    DispatcherType::PlanetaryEphemeris,
    DispatcherType::LeapSeconds,
    DispatcherType::Sclk,
    DispatcherType::RefPixel,
    // Not consumed by any pipeline.
    DispatcherType::Crct,
    DispatcherType::Ffi,
    DispatcherType::History,
    DispatcherType::ClockStateMask,
    // Target definitions and mask tables.
    DispatcherType::TargetList,
    DispatcherType::TargetListSet,
    DispatcherType::MaskTable,
    // Pixel mapping files; pixel ingestion reads them.
    DispatcherType::LongCadenceTargetPmrf,
    DispatcherType::ShortCadenceTargetPmrf,
    DispatcherType::BackgroundPmrf,
    DispatcherType::LongCadenceCollateralPmrf,
    DispatcherType::ShortCadenceCollateralPmrf,
    // Ancillary inputs for the monthly science run.
    DispatcherType::GapReport,
    DispatcherType::Histogram,
    DispatcherType::Ancillary,
    DispatcherType::ThrusterData,
    DispatcherType::DataAnomaly,
    // Pixel data.
    DispatcherType::LongCadencePixel,
    DispatcherType::ShortCadencePixel,
    DispatcherType::RclcPixel,
    // Report imagery.
    DispatcherType::UkirtImage,
];

impl DispatcherType {
    /// Every variant in declaration order.
    pub const ALL: [DispatcherType; 27] = [
        DispatcherType::ConfigMap,
        DispatcherType::SpacecraftEphemeris,
        DispatcherType::PlanetaryEphemeris,
        DispatcherType::LeapSeconds,
        DispatcherType::Sclk,
        DispatcherType::RefPixel,
        DispatcherType::Crct,
        DispatcherType::Ffi,
        DispatcherType::History,
        DispatcherType::ClockStateMask,
        DispatcherType::TargetList,
        DispatcherType::TargetListSet,
        DispatcherType::MaskTable,
        DispatcherType::LongCadenceTargetPmrf,
        DispatcherType::ShortCadenceTargetPmrf,
        DispatcherType::BackgroundPmrf,
        DispatcherType::LongCadenceCollateralPmrf,
        DispatcherType::ShortCadenceCollateralPmrf,
        DispatcherType::GapReport,
        DispatcherType::Histogram,
        DispatcherType::Ancillary,
        DispatcherType::ThrusterData,
        DispatcherType::DataAnomaly,
        DispatcherType::LongCadencePixel,
        DispatcherType::ShortCadencePixel,
        DispatcherType::RclcPixel,
        DispatcherType::UkirtImage,
    ];

    /// Upper snake-case name, identical to the serialized form.
    pub fn name(self) -> &'static str {
        match self {
            DispatcherType::ConfigMap => "CONFIG_MAP",
            DispatcherType::SpacecraftEphemeris => "SPACECRAFT_EPHEMERIS",
            DispatcherType::PlanetaryEphemeris => "PLANETARY_EPHEMERIS",
            DispatcherType::LeapSeconds => "LEAP_SECONDS",
            DispatcherType::Sclk => "SCLK",
            DispatcherType::RefPixel => "REF_PIXEL",
            DispatcherType::Crct => "CRCT",
            DispatcherType::Ffi => "FFI",
            DispatcherType::History => "HISTORY",
            DispatcherType::ClockStateMask => "CLOCK_STATE_MASK",
            DispatcherType::TargetList => "TARGET_LIST",
            DispatcherType::TargetListSet => "TARGET_LIST_SET",
            DispatcherType::MaskTable => "MASK_TABLE",
            DispatcherType::LongCadenceTargetPmrf => "LONG_CADENCE_TARGET_PMRF",
            DispatcherType::ShortCadenceTargetPmrf => "SHORT_CADENCE_TARGET_PMRF",
            DispatcherType::BackgroundPmrf => "BACKGROUND_PMRF",
            DispatcherType::LongCadenceCollateralPmrf => "LONG_CADENCE_COLLATERAL_PMRF",
            DispatcherType::ShortCadenceCollateralPmrf => "SHORT_CADENCE_COLLATERAL_PMRF",
            DispatcherType::GapReport => "GAP_REPORT",
            DispatcherType::Histogram => "HISTOGRAM",
            DispatcherType::Ancillary => "ANCILLARY",
            DispatcherType::ThrusterData => "THRUSTER_DATA",
            DispatcherType::DataAnomaly => "DATA_ANOMALY",
            DispatcherType::LongCadencePixel => "LONG_CADENCE_PIXEL",
            DispatcherType::ShortCadencePixel => "SHORT_CADENCE_PIXEL",
            DispatcherType::RclcPixel => "RCLC_PIXEL",
            DispatcherType::UkirtImage => "UKIRT_IMAGE",
        }
    }

    pub fn recognition(self) -> Recognition {
        use Recognition::{FileName, Manifest, Suffixes};

        match self {
            DispatcherType::ConfigMap => Suffixes(&["_scconfig.xml"]),
            DispatcherType::SpacecraftEphemeris => FileName {
                prefix: "spk_",
                suffix: ".bsp",
            },
            DispatcherType::PlanetaryEphemeris => FileName {
                prefix: "de",
                suffix: ".bsp",
            },
            DispatcherType::LeapSeconds => FileName {
                prefix: "naif",
                suffix: ".tls",
            },
            DispatcherType::Sclk => FileName {
                prefix: "kplr",
                suffix: ".tsc",
            },
            DispatcherType::RefPixel => Suffixes(&["_rp.rp"]),
            DispatcherType::Crct => Suffixes(&["_crct.xml"]),
            DispatcherType::Ffi => Suffixes(&["_ffi-orig.fits"]),
            DispatcherType::History => Suffixes(&[
                "_lcs-history.txt",
                "_scs-history.txt",
                "_scs-set-history.txt",
            ]),
            DispatcherType::ClockStateMask => Suffixes(&["_csm.xml"]),
            DispatcherType::TargetList => Manifest("_tlnm.xml"),
            DispatcherType::TargetListSet => Manifest("_tlsnm.xml"),
            DispatcherType::MaskTable => Manifest("_mtnm.xml"),
            DispatcherType::LongCadenceTargetPmrf => Suffixes(&["_lcm.fits"]),
            DispatcherType::ShortCadenceTargetPmrf => Suffixes(&["_scm.fits"]),
            DispatcherType::BackgroundPmrf => Suffixes(&["_bgm.fits"]),
            DispatcherType::LongCadenceCollateralPmrf => Suffixes(&["_lcc.fits"]),
            DispatcherType::ShortCadenceCollateralPmrf => Suffixes(&["_scc.fits"]),
            DispatcherType::GapReport => Suffixes(&["_gap-report.xml"]),
            DispatcherType::Histogram => Suffixes(&["_histogram.xml"]),
            DispatcherType::Ancillary => Suffixes(&["_anc-eng.fits"]),
            DispatcherType::ThrusterData => Suffixes(&["_thruster-firing.csv"]),
            DispatcherType::DataAnomaly => Suffixes(&["_data-anomaly.xml"]),
            DispatcherType::LongCadencePixel => {
                Suffixes(&["_lcs-targ.fits", "_lcs-col.fits", "_lcs-bkg.fits"])
            }
            DispatcherType::ShortCadencePixel => Suffixes(&["_scs-targ.fits", "_scs-col.fits"]),
            DispatcherType::RclcPixel => Manifest("_rclcnm.xml"),
            DispatcherType::UkirtImage => FileName {
                prefix: "",
                suffix: ".png",
            },
        }
    }

    /// Type whose conventional suffix (e.g. `_ffi-orig.fits`) is exactly `suffix`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| match ty.recognition() {
            Recognition::Suffixes(suffixes) => suffixes.contains(&suffix),
            _ => false,
        })
    }

    /// Type of a file that does not follow the `kplr<timestamp>_` convention.
    pub fn from_nonconforming_file_name(file_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| match ty.recognition() {
            Recognition::FileName { prefix, suffix } => {
                file_name.len() > prefix.len() + suffix.len()
                    && file_name.starts_with(prefix)
                    && file_name.ends_with(suffix)
            }
            _ => false,
        })
    }

    /// Whole-message type selected by a notification message filename.
    pub fn from_manifest_name(manifest_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| match ty.recognition() {
            Recognition::Manifest(suffix) => manifest_name.ends_with(suffix),
            _ => false,
        })
    }

    /// `true` when one dispatcher of this type consumes a whole message.
    pub fn is_whole_manifest(self) -> bool {
        matches!(self.recognition(), Recognition::Manifest(_))
    }
}

impl fmt::Display for DispatcherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DispatcherType {
    type Err = String;

    /// Accepts `FFI`, `ffi`, `long-cadence-pixel` and `long_cadence_pixel` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == normalized)
            .ok_or_else(|| format!("unknown dispatcher type '{s}'"))
    }
}
