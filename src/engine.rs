use std::sync::Mutex;

use tracing::{debug, trace};

use crate::brand::{Brand, Tally};
use crate::error::Error;
use crate::flags::Flags;
use crate::probes;
use crate::registry::{Platforms, ProbeDescriptor, REGISTRY};

/// The full outcome of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) verdict: bool,
    pub(crate) percentage: u8,
    pub(crate) brand: Brand,
}

/// Walks a probe table and caches the most recent result.
///
/// The cache slot is deliberately keyed on nothing: it stores the last
/// full result irrespective of the flag set that produced it, so a second
/// call with different flags is served the first call's answer unless
/// `NO_MEMO` is passed. Callers mixing flag sets should pass `NO_MEMO`.
pub(crate) struct Engine {
    table: &'static [ProbeDescriptor],
    cache: Mutex<Option<Report>>,
}

/// The process-wide engine over the real probe registry.
pub(crate) static ENGINE: Engine = Engine::new(&REGISTRY);

fn validate(flags: Flags) -> Result<(), Error> {
    if flags.bits() & !Flags::all().bits() != 0 {
        return Err(Error::InvalidArgument("unrecognized flag bits set"));
    }
    Ok(())
}

impl Engine {
    pub(crate) const fn new(table: &'static [ProbeDescriptor]) -> Self {
        Engine {
            table,
            cache: Mutex::new(None),
        }
    }

    /// Runs a full detection pass for `flags`, honoring the memoization
    /// contract.
    pub(crate) fn run(&self, flags: Flags) -> Result<Report, Error> {
        validate(flags)?;
        let no_memo = flags.contains(Flags::NO_MEMO);
        let extreme = flags.contains(Flags::EXTREME);
        let selected = flags.techniques();
        let enabled = if selected.is_empty() {
            Flags::DEFAULT
        } else {
            selected
        };

        if !no_memo {
            if let Ok(slot) = self.cache.lock() {
                if let Some(report) = *slot {
                    trace!(?report, "serving memoized detection result");
                    return Ok(report);
                }
            }
        }

        let report = self.aggregate(enabled, extreme);
        if !no_memo {
            if let Ok(mut slot) = self.cache.lock() {
                *slot = Some(report);
            }
        }
        Ok(report)
    }

    fn aggregate(&self, enabled: Flags, extreme: bool) -> Report {
        let mut tally = Tally::new();
        let mut score: u32 = 0;
        let platform = Platforms::current();
        for descriptor in self.table {
            if !enabled.contains(descriptor.flag) {
                continue;
            }
            if !descriptor.platforms.contains(platform) {
                continue;
            }
            if descriptor.requires_root && !probes::is_root() {
                continue;
            }
            if (descriptor.probe)(&mut tally) {
                trace!(technique = ?descriptor.flag, weight = descriptor.weight, "probe fired");
                score += u32::from(descriptor.weight);
            }
        }
        let percentage = score.min(100) as u8;
        let verdict = if extreme {
            score > 0
        } else {
            percentage >= 100
        };
        let brand = tally.leader();
        debug!(
            score,
            percentage,
            verdict,
            brand = brand.name(),
            "detection run complete"
        );
        Report {
            verdict,
            percentage,
            brand,
        }
    }

    /// Runs exactly one probe, bypassing both the cache and the scoring
    /// machinery.
    pub(crate) fn check_one(&self, flag: Flags) -> Result<bool, Error> {
        validate(flag)?;
        if flag.intersects(Flags::NO_MEMO | Flags::EXTREME) {
            return Err(Error::InvalidArgument("check accepts no behavioral flags"));
        }
        if !flag.is_single_technique() {
            return Err(Error::InvalidArgument(
                "check requires exactly one technique flag",
            ));
        }
        let descriptor = self
            .table
            .iter()
            .find(|descriptor| descriptor.flag == flag)
            .ok_or(Error::InvalidArgument("technique is not registered"))?;
        if !descriptor.platforms.contains(Platforms::current()) {
            return Ok(false);
        }
        if descriptor.requires_root && !probes::is_root() {
            return Ok(false);
        }
        let mut tally = Tally::new();
        Ok((descriptor.probe)(&mut tally))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const EVERYWHERE: Platforms = Platforms::all();

    const fn stub(flag: Flags, weight: u8, probe: fn(&mut Tally) -> bool) -> ProbeDescriptor {
        ProbeDescriptor {
            flag,
            weight,
            platforms: EVERYWHERE,
            requires_root: false,
            default_set: true,
            probe,
        }
    }

    fn hit(_: &mut Tally) -> bool {
        true
    }

    fn miss(_: &mut Tally) -> bool {
        false
    }

    fn vote_virtualbox(tally: &mut Tally) -> bool {
        tally.vote(Brand::VirtualBox);
        true
    }

    fn vote_kvm(tally: &mut Tally) -> bool {
        tally.vote(Brand::Kvm);
        true
    }

    fn vote_qemu(tally: &mut Tally) -> bool {
        tally.vote(Brand::Qemu);
        true
    }

    fn vote_vmware(tally: &mut Tally) -> bool {
        tally.vote(Brand::VMware);
        true
    }

    #[test]
    fn single_certain_probe_reaches_the_verdict() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, hit)];
        let engine = Engine::new(&TABLE);
        let report = engine.run(Flags::VMID | Flags::NO_MEMO).unwrap();
        assert!(report.verdict);
        assert_eq!(report.percentage, 100);
    }

    #[test]
    fn two_moderate_probes_cross_the_threshold_together() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 50, hit),
            stub(Flags::BRAND, 50, hit),
        ];
        let engine = Engine::new(&TABLE);
        let both = engine
            .run(Flags::VMID | Flags::BRAND | Flags::NO_MEMO)
            .unwrap();
        assert!(both.verdict);
        assert_eq!(both.percentage, 100);

        let one = engine.run(Flags::VMID | Flags::NO_MEMO).unwrap();
        assert!(!one.verdict);
        assert_eq!(one.percentage, 50);
    }

    #[test]
    fn extreme_accepts_any_evidence() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VBOX_REG, 30, vote_virtualbox)];
        let engine = Engine::new(&TABLE);

        let normal = engine.run(Flags::VBOX_REG | Flags::NO_MEMO).unwrap();
        assert!(!normal.verdict);
        assert_eq!(normal.percentage, 30);
        assert_eq!(normal.brand, Brand::VirtualBox);

        let extreme = engine
            .run(Flags::VBOX_REG | Flags::NO_MEMO | Flags::EXTREME)
            .unwrap();
        assert!(extreme.verdict);
        assert_eq!(extreme.percentage, 30);
    }

    #[test]
    fn extreme_without_evidence_stays_negative() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, miss)];
        let engine = Engine::new(&TABLE);
        let report = engine
            .run(Flags::VMID | Flags::NO_MEMO | Flags::EXTREME)
            .unwrap();
        assert!(!report.verdict);
        assert_eq!(report.percentage, 0);
        assert_eq!(report.brand, Brand::Unknown);
    }

    #[test]
    fn percentage_clamps_at_one_hundred() {
        static TABLE: [ProbeDescriptor; 3] = [
            stub(Flags::VMID, 100, hit),
            stub(Flags::BRAND, 90, hit),
            stub(Flags::MAC, 90, hit),
        ];
        let engine = Engine::new(&TABLE);
        let report = engine
            .run(Flags::VMID | Flags::BRAND | Flags::MAC | Flags::NO_MEMO)
            .unwrap();
        assert_eq!(report.percentage, 100);
    }

    #[test]
    fn score_is_monotonic_over_technique_subsets() {
        static TABLE: [ProbeDescriptor; 3] = [
            stub(Flags::VMID, 40, hit),
            stub(Flags::BRAND, 30, hit),
            stub(Flags::MAC, 20, hit),
        ];
        let engine = Engine::new(&TABLE);
        let subset = engine.run(Flags::VMID | Flags::NO_MEMO).unwrap();
        let superset = engine
            .run(Flags::VMID | Flags::BRAND | Flags::NO_MEMO)
            .unwrap();
        let full = engine
            .run(Flags::VMID | Flags::BRAND | Flags::MAC | Flags::NO_MEMO)
            .unwrap();
        assert!(subset.percentage <= superset.percentage);
        assert!(superset.percentage <= full.percentage);
    }

    #[test]
    fn plurality_attributes_the_brand() {
        static TABLE: [ProbeDescriptor; 3] = [
            stub(Flags::SYSTEMD, 10, vote_kvm),
            stub(Flags::CVENDOR, 10, vote_kvm),
            stub(Flags::BRAND, 10, vote_qemu),
        ];
        let engine = Engine::new(&TABLE);
        let report = engine
            .run(Flags::SYSTEMD | Flags::CVENDOR | Flags::BRAND | Flags::NO_MEMO)
            .unwrap();
        assert_eq!(report.brand, Brand::Kvm);
    }

    #[test]
    fn tied_brands_resolve_to_unknown() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMWARE_REG, 10, vote_vmware),
            stub(Flags::VBOX_REG, 10, vote_virtualbox),
        ];
        let engine = Engine::new(&TABLE);
        let report = engine
            .run(Flags::VMWARE_REG | Flags::VBOX_REG | Flags::NO_MEMO)
            .unwrap();
        assert_eq!(report.brand, Brand::Unknown);
    }

    static DEFAULT_SUB_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted_default_sub(_: &mut Tally) -> bool {
        DEFAULT_SUB_CALLS.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn default_subtraction_never_invokes_the_removed_probe() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 10, counted_default_sub),
            stub(Flags::BRAND, 10, miss),
        ];
        let engine = Engine::new(&TABLE);
        let report = engine
            .run((Flags::DEFAULT & !Flags::VMID) | Flags::NO_MEMO)
            .unwrap();
        assert_eq!(DEFAULT_SUB_CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(report.percentage, 0);

        engine.run(Flags::DEFAULT | Flags::NO_MEMO).unwrap();
        assert_eq!(DEFAULT_SUB_CALLS.load(Ordering::SeqCst), 1);
    }

    static EMPTY_FLAGS_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted_empty_flags(_: &mut Tally) -> bool {
        EMPTY_FLAGS_CALLS.fetch_add(1, Ordering::SeqCst);
        false
    }

    #[test]
    fn empty_selection_expands_to_the_default_set() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 10, counted_empty_flags),
            ProbeDescriptor {
                flag: Flags::CURSOR,
                weight: 10,
                platforms: EVERYWHERE,
                requires_root: false,
                default_set: false,
                probe: hit,
            },
        ];
        let engine = Engine::new(&TABLE);
        let report = engine.run(Flags::NO_MEMO).unwrap();
        assert_eq!(EMPTY_FLAGS_CALLS.load(Ordering::SeqCst), 1);
        // CURSOR is outside DEFAULT, so the always-hitting probe must not
        // have contributed.
        assert_eq!(report.percentage, 0);

        let all = engine
            .run(Flags::ALL_TECHNIQUES | Flags::NO_MEMO)
            .unwrap();
        assert_eq!(all.percentage, 10);
    }

    static MEMO_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted_memo(_: &mut Tally) -> bool {
        MEMO_CALLS.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn memoization_runs_the_probes_once() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, counted_memo)];
        let engine = Engine::new(&TABLE);
        let first = engine.run(Flags::VMID).unwrap();
        let second = engine.run(Flags::VMID).unwrap();
        assert_eq!(first, second);
        assert_eq!(MEMO_CALLS.load(Ordering::SeqCst), 1);

        engine.run(Flags::VMID | Flags::NO_MEMO).unwrap();
        engine.run(Flags::VMID | Flags::NO_MEMO).unwrap();
        assert_eq!(MEMO_CALLS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn memoized_result_ignores_the_new_flag_set() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 100, hit),
            stub(Flags::BRAND, 10, hit),
        ];
        let engine = Engine::new(&TABLE);
        let first = engine.run(Flags::VMID).unwrap();
        assert_eq!(first.percentage, 100);
        // Different selection, same cached answer.
        let second = engine.run(Flags::BRAND).unwrap();
        assert_eq!(second, first);
        // NO_MEMO bypasses the slot and sees the real selection.
        let fresh = engine.run(Flags::BRAND | Flags::NO_MEMO).unwrap();
        assert_eq!(fresh.percentage, 10);
    }

    static CHECK_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted_check(_: &mut Tally) -> bool {
        CHECK_CALLS.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn check_runs_the_probe_every_time_and_skips_the_cache() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, counted_check)];
        let engine = Engine::new(&TABLE);
        let before = engine.run(Flags::VMID).unwrap();
        assert_eq!(CHECK_CALLS.load(Ordering::SeqCst), 1);

        assert!(engine.check_one(Flags::VMID).unwrap());
        assert!(engine.check_one(Flags::VMID).unwrap());
        assert_eq!(CHECK_CALLS.load(Ordering::SeqCst), 3);

        // The memo slot is untouched by check: the next run is still served
        // from the cache instead of invoking the probe again.
        let after = engine.run(Flags::VMID).unwrap();
        assert_eq!(after, before);
        assert_eq!(CHECK_CALLS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn check_rejects_malformed_arguments() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 100, hit),
            stub(Flags::BRAND, 50, hit),
        ];
        let engine = Engine::new(&TABLE);
        assert!(matches!(
            engine.check_one(Flags::VMID | Flags::BRAND),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.check_one(Flags::NO_MEMO),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.check_one(Flags::EXTREME | Flags::VMID),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.check_one(Flags::empty()),
            Err(Error::InvalidArgument(_))
        ));
        // Registered single techniques still work.
        assert!(engine.check_one(Flags::VMID).unwrap());
    }

    #[test]
    fn check_on_an_unregistered_technique_is_invalid() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, hit)];
        let engine = Engine::new(&TABLE);
        assert!(matches!(
            engine.check_one(Flags::SYSTEMD),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_bits_are_rejected() {
        static TABLE: [ProbeDescriptor; 1] = [stub(Flags::VMID, 100, hit)];
        let engine = Engine::new(&TABLE);
        let bogus = Flags::from_bits_retain(1 << 60);
        assert!(matches!(
            engine.run(bogus),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.check_one(bogus),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn verdict_matches_percentage_threshold_without_extreme() {
        static TABLE: [ProbeDescriptor; 2] = [
            stub(Flags::VMID, 60, hit),
            stub(Flags::BRAND, 40, hit),
        ];
        let engine = Engine::new(&TABLE);
        for flags in [
            Flags::VMID,
            Flags::BRAND,
            Flags::VMID | Flags::BRAND,
        ] {
            let report = engine.run(flags | Flags::NO_MEMO).unwrap();
            assert_eq!(report.verdict, report.percentage >= 100);
        }
    }
}
