use bitflags::bitflags;

/// Number of technique bits; positions above this are reserved for
/// behavioral flags.
pub(crate) const TECHNIQUE_COUNT: u32 = 58;

const TECHNIQUE_MASK: u64 = (1 << TECHNIQUE_COUNT) - 1;

bitflags! {
    /// Selects which detection techniques run and how the aggregator
    /// behaves.
    ///
    /// Technique bits occupy the low end of the mask in a stable order, so
    /// `Flags::DEFAULT & !Flags::RDTSC` means "the default set without the
    /// RDTSC timing probe". `NO_MEMO` and `EXTREME` live in reserved high
    /// bits and never select a probe on their own.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u64 {
        const VMID = 1 << 0;
        const BRAND = 1 << 1;
        const HYPERVISOR_BIT = 1 << 2;
        const CPUID_0X4 = 1 << 3;
        const HYPERVISOR_STR = 1 << 4;
        const RDTSC = 1 << 5;
        const SIDT5 = 1 << 6;
        const THREADCOUNT = 1 << 7;
        const MAC = 1 << 8;
        const TEMPERATURE = 1 << 9;
        const SYSTEMD = 1 << 10;
        const CVENDOR = 1 << 11;
        const CTYPE = 1 << 12;
        const DOCKERENV = 1 << 13;
        const DMIDECODE = 1 << 14;
        const DMESG = 1 << 15;
        const HWMON = 1 << 16;
        const CURSOR = 1 << 17;
        const VMWARE_REG = 1 << 18;
        const VBOX_REG = 1 << 19;
        const USER = 1 << 20;
        const DLL = 1 << 21;
        const REGISTRY = 1 << 22;
        const SUNBELT_VM = 1 << 23;
        const WINE_CHECK = 1 << 24;
        const VM_FILES = 1 << 25;
        const HWMODEL = 1 << 26;
        const DISK_SIZE = 1 << 27;
        const VBOX_DEFAULT = 1 << 28;
        const VBOX_NETWORK = 1 << 29;
        const COMPUTER_NAME = 1 << 30;
        const HOSTNAME = 1 << 31;
        const MEMORY = 1 << 32;
        const VM_PROCESSES = 1 << 33;
        const LINUX_USER_HOST = 1 << 34;
        const VBOX_WINDOW_CLASS = 1 << 35;
        const WMIC = 1 << 36;
        const GAMARUE = 1 << 37;
        const VMID_0X4 = 1 << 38;
        const PARALLELS_VM = 1 << 39;
        const RDTSC_VMEXIT = 1 << 40;
        const LOADED_DLLS = 1 << 41;
        const QEMU_BRAND = 1 << 42;
        const BOCHS_CPU = 1 << 43;
        const VPC_BOARD = 1 << 44;
        const HYPERV_WMI = 1 << 45;
        const HYPERV_REG = 1 << 46;
        const BIOS_SERIAL = 1 << 47;
        const VBOX_FOLDERS = 1 << 48;
        const VBOX_MSSMBIOS = 1 << 49;
        const MAC_HYPERTHREAD = 1 << 50;
        const MAC_MEMSIZE = 1 << 51;
        const MAC_IOKIT = 1 << 52;
        const IOREG_GREP = 1 << 53;
        const MAC_SIP = 1 << 54;
        const KVM_REG = 1 << 55;
        const KVM_DRIVERS = 1 << 56;
        const KVM_DIRS = 1 << 57;

        /// Skip the memoization cache for this call, both reading and
        /// writing.
        const NO_MEMO = 1 << 62;
        /// Declare a VM as soon as any enabled probe fires instead of
        /// requiring the weighted score to reach certainty.
        const EXTREME = 1 << 63;

        /// Every technique, including those excluded from `DEFAULT` such
        /// as the blocking `CURSOR` probe.
        const ALL_TECHNIQUES = TECHNIQUE_MASK;
        /// The techniques run when no selection is supplied. Excludes
        /// `CURSOR`, which blocks for up to five seconds.
        const DEFAULT = TECHNIQUE_MASK & !Self::CURSOR.bits();
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::DEFAULT
    }
}

impl Flags {
    /// The technique-selecting portion of this mask, with behavioral bits
    /// stripped.
    pub(crate) fn techniques(self) -> Flags {
        self & Flags::ALL_TECHNIQUES
    }

    pub(crate) fn is_single_technique(self) -> bool {
        self.bits().count_ones() == 1 && !self.techniques().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_cursor() {
        assert!(!Flags::DEFAULT.contains(Flags::CURSOR));
        assert!(Flags::ALL_TECHNIQUES.contains(Flags::CURSOR));
        assert_eq!(Flags::DEFAULT | Flags::CURSOR, Flags::ALL_TECHNIQUES);
    }

    #[test]
    fn default_subtraction_is_plain_arithmetic() {
        let without_rdtsc = Flags::DEFAULT & !Flags::RDTSC;
        assert!(!without_rdtsc.contains(Flags::RDTSC));
        assert!(without_rdtsc.contains(Flags::VMID));
        assert_eq!(without_rdtsc | Flags::RDTSC, Flags::DEFAULT);
    }

    #[test]
    fn meta_bits_do_not_overlap_techniques() {
        assert!((Flags::NO_MEMO | Flags::EXTREME).techniques().is_empty());
        assert!((Flags::NO_MEMO | Flags::EXTREME | Flags::VMID)
            .techniques()
            .is_single_technique());
    }

    #[test]
    fn single_technique_classification() {
        assert!(Flags::VMID.is_single_technique());
        assert!(!(Flags::VMID | Flags::BRAND).is_single_technique());
        assert!(!Flags::NO_MEMO.is_single_technique());
        assert!(!Flags::empty().is_single_technique());
    }
}
