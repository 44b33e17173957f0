use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// All modifier arithmetic (speed multipliers, effective durations) runs on
/// this type so two hosts ticking the same controllers agree bit-for-bit.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in the tick loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in the tick loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Ceiling of a positive Fixed64 as a tick count, clamped to at least 1.
///
/// Used for effective durations: a speed multiplier can never shrink a recipe
/// below one tick.
#[inline]
pub fn ceil_ticks(v: Fixed64) -> Ticks {
    let whole: i64 = v.to_num();
    let ceiled = if v.frac() > Fixed64::from_num(0) {
        whole + 1
    } else {
        whole
    };
    ceiled.max(1) as Ticks
}
