//! The data model from spec.md §3: gas mixes, samples, and the field/record
//! types the parser decodes into.

use serde::Serialize;

/// One gas mix used during a dive. `oxygen + helium + nitrogen` must sum to
/// `1.0`; callers that construct one from decoded device bytes should go
/// through [`GasMix::new`], which checks the invariant in debug builds
/// rather than silently accepting bad data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasMix {
    pub oxygen: f64,
    pub helium: f64,
    pub nitrogen: f64,
}

impl GasMix {
    pub fn new(oxygen: f64, helium: f64, nitrogen: f64) -> Self {
        debug_assert!(
            (oxygen + helium + nitrogen - 1.0).abs() < 1e-6,
            "gas mix fractions must sum to 1.0: o2={oxygen} he={helium} n2={nitrogen}"
        );
        GasMix {
            oxygen,
            helium,
            nitrogen,
        }
    }

    pub fn air() -> Self {
        GasMix::new(0.21, 0.0, 0.79)
    }
}

/// Warning bits carried in each 20-second sample step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DecoStop,
    Rbt,
    Ascent,
    Ceiling,
    Workload,
    Transmitter,
}

/// The six warning bits, in the order they're packed into the flags byte.
pub const EVENT_BITS: [EventKind; 6] = [
    EventKind::DecoStop,
    EventKind::Rbt,
    EventKind::Ascent,
    EventKind::Ceiling,
    EventKind::Workload,
    EventKind::Transmitter,
];

/// One entry in a dive's sample stream, tagged per spec.md §3. This parser
/// only ever emits `Time`, `Depth`, `Event`, and `Vendor`; `Pressure` and
/// `Temperature` are part of the shared stream vocabulary for other device
/// families that do decode them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    Time(u32),
    Depth(f64),
    Pressure(f64),
    Temperature(f64),
    Event(EventKind),
    Vendor(Vec<u8>),
}

/// Selector for [`crate::parser::DiveRecord::field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    DiveTime,
    MaxDepth,
    GasMixCount,
    GasMix(usize),
}

/// Decoded value for a given [`FieldKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Seconds(u32),
    Meters(f64),
    Count(u32),
    Mix(GasMix),
}
