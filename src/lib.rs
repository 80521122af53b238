//! Detection of virtualized, emulated and sandboxed environments.
//!
//! The engine runs a table of independent probes, each reading one OS
//! surface (CPUID leaves, registry keys, sysfs entries, WMI inventory,
//! MAC prefixes, timing behavior) and scoring a certainty weight when it
//! fires. The weighted sum, clamped to a percentage, decides the verdict;
//! probes that recognize a specific product also vote on the brand.
//!
//! ```no_run
//! use vmprobe::Flags;
//!
//! if vmprobe::detect(Flags::default()).unwrap() {
//!     println!("inside a {} guest", vmprobe::brand());
//! }
//! ```
//!
//! Results are memoized: the most recent full run is cached regardless of
//! the flag set that produced it, so pass [`Flags::NO_MEMO`] when mixing
//! different selections in one process.

mod brand;
mod engine;
mod error;
mod flags;
mod probes;
mod registry;

pub use brand::Brand;
pub use error::Error;
pub use flags::Flags;

/// Whether the current process appears to run inside a VM or sandbox.
///
/// With no technique bits selected the default set runs. The verdict is
/// positive once the weighted score reaches full certainty, or as soon as
/// any enabled probe fires when [`Flags::EXTREME`] is set.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if `flags` carries unassigned bits.
pub fn detect(flags: Flags) -> Result<bool, Error> {
    engine::ENGINE.run(flags).map(|report| report.verdict)
}

/// The clamped confidence percentage for the same run [`detect`] performs.
///
/// Always within `0..=100`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if `flags` carries unassigned bits.
pub fn percentage(flags: Flags) -> Result<u8, Error> {
    engine::ENGINE.run(flags).map(|report| report.percentage)
}

/// The brand of the detected environment, as a stable literal.
///
/// Runs the default technique set (memoized like [`detect`]) and returns
/// the brand with a strict plurality of probe votes. A tie at the top, or
/// no votes at all, yields `"Unknown"`.
pub fn brand() -> &'static str {
    match engine::ENGINE.run(Flags::DEFAULT) {
        Ok(report) => report.brand.name(),
        Err(_) => Brand::Unknown.name(),
    }
}

/// Runs a single named probe and returns its raw answer.
///
/// The probe runs unconditionally on every call: no cache read, no cache
/// write, no score. Platform and privilege gating still apply, so a probe
/// foreign to the running OS answers `false`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] unless `flag` is exactly one technique bit
/// with no behavioral bits attached.
pub fn check(flag: Flags) -> Result<bool, Error> {
    engine::ENGINE.check_one(flag)
}
