use std::fmt;

/// Identity of a detected hypervisor, emulator or analysis sandbox.
///
/// The display names are stable and exact; callers matching on them can
/// rely on the literals never changing spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brand {
    VMware,
    VirtualBox,
    Bhyve,
    Kvm,
    Qemu,
    QemuKvm,
    HyperV,
    MicrosoftXta,
    Parallels,
    XenHvm,
    Acrn,
    QnxHypervisor,
    HybridAnalysis,
    Sandboxie,
    Docker,
    Wine,
    VirtualApple,
    VirtualPc,
    Anubis,
    JoeBox,
    ThreadExpert,
    CwSandbox,
    SunBelt,
    Comodo,
    Bochs,
    Unknown,
}

/// Number of nameable brands, excluding the `Unknown` sentinel.
pub(crate) const NAMED_BRANDS: usize = 25;

impl Brand {
    /// The stable human-readable name for this brand.
    pub fn name(self) -> &'static str {
        match self {
            Brand::VMware => "VMware",
            Brand::VirtualBox => "VirtualBox",
            Brand::Bhyve => "bhyve",
            Brand::Kvm => "KVM",
            Brand::Qemu => "QEMU",
            Brand::QemuKvm => "QEMU/KVM",
            Brand::HyperV => "Microsoft Hyper-V",
            Brand::MicrosoftXta => "Microsoft x86-to-ARM",
            Brand::Parallels => "Parallels",
            Brand::XenHvm => "Xen HVM",
            Brand::Acrn => "ACRN",
            Brand::QnxHypervisor => "QNX hypervisor",
            Brand::HybridAnalysis => "Hybrid Analysis",
            Brand::Sandboxie => "Sandboxie",
            Brand::Docker => "Docker",
            Brand::Wine => "Wine",
            Brand::VirtualApple => "Virtual Apple",
            Brand::VirtualPc => "Virtual PC",
            Brand::Anubis => "Anubis",
            Brand::JoeBox => "JoeBox",
            Brand::ThreadExpert => "Thread Expert",
            Brand::CwSandbox => "CW Sandbox",
            Brand::SunBelt => "SunBelt",
            Brand::Comodo => "Comodo",
            Brand::Bochs => "Bochs",
            Brand::Unknown => "Unknown",
        }
    }

    fn from_index(index: usize) -> Brand {
        const ORDER: [Brand; NAMED_BRANDS] = [
            Brand::VMware,
            Brand::VirtualBox,
            Brand::Bhyve,
            Brand::Kvm,
            Brand::Qemu,
            Brand::QemuKvm,
            Brand::HyperV,
            Brand::MicrosoftXta,
            Brand::Parallels,
            Brand::XenHvm,
            Brand::Acrn,
            Brand::QnxHypervisor,
            Brand::HybridAnalysis,
            Brand::Sandboxie,
            Brand::Docker,
            Brand::Wine,
            Brand::VirtualApple,
            Brand::VirtualPc,
            Brand::Anubis,
            Brand::JoeBox,
            Brand::ThreadExpert,
            Brand::CwSandbox,
            Brand::SunBelt,
            Brand::Comodo,
            Brand::Bochs,
        ];
        ORDER[index]
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-run brand vote counts. Created empty for every non-memoized
/// aggregator run and consumed once the walk finishes; probes vote as they
/// fire.
#[derive(Debug)]
pub(crate) struct Tally {
    votes: [u32; NAMED_BRANDS],
}

impl Tally {
    pub(crate) fn new() -> Self {
        Tally {
            votes: [0; NAMED_BRANDS],
        }
    }

    pub(crate) fn vote(&mut self, brand: Brand) {
        self.vote_n(brand, 1);
    }

    pub(crate) fn vote_n(&mut self, brand: Brand, count: u32) {
        if brand != Brand::Unknown {
            self.votes[brand as usize] += count;
        }
    }

    /// The brand with the strictly highest vote count. A tie at the top or
    /// an empty tally yields `Unknown`.
    pub(crate) fn leader(&self) -> Brand {
        let mut best = Brand::Unknown;
        let mut best_votes = 0u32;
        let mut contested = false;
        for (index, &votes) in self.votes.iter().enumerate() {
            if votes > best_votes {
                best = Brand::from_index(index);
                best_votes = votes;
                contested = false;
            } else if votes != 0 && votes == best_votes {
                contested = true;
            }
        }
        if best_votes == 0 || contested {
            Brand::Unknown
        } else {
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tally_is_unknown() {
        assert_eq!(Tally::new().leader(), Brand::Unknown);
    }

    #[test]
    fn strict_plurality_wins() {
        let mut tally = Tally::new();
        tally.vote(Brand::Kvm);
        tally.vote(Brand::Kvm);
        tally.vote(Brand::Qemu);
        assert_eq!(tally.leader(), Brand::Kvm);
    }

    #[test]
    fn top_tie_is_unknown() {
        let mut tally = Tally::new();
        tally.vote(Brand::VMware);
        tally.vote(Brand::VirtualBox);
        assert_eq!(tally.leader(), Brand::Unknown);
    }

    #[test]
    fn unknown_votes_are_discarded() {
        let mut tally = Tally::new();
        tally.vote(Brand::Unknown);
        tally.vote_n(Brand::Unknown, 5);
        assert_eq!(tally.leader(), Brand::Unknown);
        tally.vote(Brand::Wine);
        assert_eq!(tally.leader(), Brand::Wine);
    }

    #[test]
    fn names_are_exact_literals() {
        assert_eq!(Brand::QemuKvm.name(), "QEMU/KVM");
        assert_eq!(Brand::HyperV.name(), "Microsoft Hyper-V");
        assert_eq!(Brand::MicrosoftXta.name(), "Microsoft x86-to-ARM");
        assert_eq!(Brand::QnxHypervisor.name(), "QNX hypervisor");
        assert_eq!(Brand::Bhyve.name(), "bhyve");
        assert_eq!(Brand::Unknown.to_string(), "Unknown");
    }
}
