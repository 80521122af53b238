use bitflags::bitflags;

use crate::brand::Tally;
use crate::flags::Flags;
use crate::probes::{self, cpu, linux, macos, windows};

bitflags! {
    /// Operating systems a probe can run on. On other platforms the
    /// aggregator skips the probe without invoking it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Platforms: u8 {
        const LINUX = 1 << 0;
        const WINDOWS = 1 << 1;
        const MACOS = 1 << 2;
    }
}

impl Platforms {
    pub(crate) fn current() -> Platforms {
        if cfg!(target_os = "linux") {
            Platforms::LINUX
        } else if cfg!(target_os = "windows") {
            Platforms::WINDOWS
        } else if cfg!(target_os = "macos") {
            Platforms::MACOS
        } else {
            Platforms::empty()
        }
    }
}

const L: Platforms = Platforms::LINUX;
const W: Platforms = Platforms::WINDOWS;
const M: Platforms = Platforms::MACOS;
const LW: Platforms = L.union(W);
const LWM: Platforms = L.union(W).union(M);

/// One row of the probe table: the single source of truth for a
/// technique's weight, platform coverage, privilege requirement and
/// default-set membership.
pub(crate) struct ProbeDescriptor {
    pub(crate) flag: Flags,
    pub(crate) weight: u8,
    pub(crate) platforms: Platforms,
    pub(crate) requires_root: bool,
    pub(crate) default_set: bool,
    pub(crate) probe: fn(&mut Tally) -> bool,
}

const fn entry(
    flag: Flags,
    weight: u8,
    platforms: Platforms,
    requires_root: bool,
    default_set: bool,
    probe: fn(&mut Tally) -> bool,
) -> ProbeDescriptor {
    ProbeDescriptor {
        flag,
        weight,
        platforms,
        requires_root,
        default_set,
        probe,
    }
}

/// The probe table, in stable flag-bit order. The aggregator walks it
/// front to back, so detection runs are deterministic for a fixed
/// environment and flag set.
#[rustfmt::skip]
pub(crate) static REGISTRY: [ProbeDescriptor; 58] = [
    entry(Flags::VMID,              100, LWM, false, true,  cpu::vmid),
    entry(Flags::BRAND,              50, LWM, false, true,  cpu::brand),
    entry(Flags::HYPERVISOR_BIT,     95, LWM, false, true,  cpu::hypervisor_bit),
    entry(Flags::CPUID_0X4,          70, LWM, false, true,  cpu::cpuid_0x4),
    entry(Flags::HYPERVISOR_STR,     45, LWM, false, true,  cpu::hypervisor_str),
    entry(Flags::RDTSC,              20, LW,  false, true,  cpu::rdtsc),
    entry(Flags::SIDT5,              45, L,   false, true,  cpu::sidt5),
    entry(Flags::THREADCOUNT,        35, LWM, false, true,  probes::threadcount),
    entry(Flags::MAC,                90, LW,  false, true,  probes::mac),
    entry(Flags::TEMPERATURE,        15, L,   false, true,  linux::temperature),
    entry(Flags::SYSTEMD,            70, L,   false, true,  linux::systemd),
    entry(Flags::CVENDOR,            65, L,   false, true,  linux::cvendor),
    entry(Flags::CTYPE,              10, L,   false, true,  linux::ctype),
    entry(Flags::DOCKERENV,          80, L,   false, true,  linux::dockerenv),
    entry(Flags::DMIDECODE,          55, L,   true,  true,  linux::dmidecode),
    entry(Flags::DMESG,              55, L,   true,  true,  linux::dmesg),
    entry(Flags::HWMON,              75, L,   false, true,  linux::hwmon),
    entry(Flags::CURSOR,             10, W,   false, false, windows::cursor),
    entry(Flags::VMWARE_REG,         65, W,   false, true,  windows::vmware_reg),
    entry(Flags::VBOX_REG,           65, W,   false, true,  windows::vbox_reg),
    entry(Flags::USER,               35, W,   false, true,  windows::user),
    entry(Flags::DLL,                50, W,   false, true,  windows::dll),
    entry(Flags::REGISTRY,           75, W,   false, true,  windows::registry),
    entry(Flags::SUNBELT_VM,         10, W,   false, true,  windows::sunbelt_vm),
    entry(Flags::WINE_CHECK,         85, W,   false, true,  windows::wine_check),
    entry(Flags::VM_FILES,           10, W,   false, true,  windows::vm_files),
    entry(Flags::HWMODEL,            75, M,   false, true,  macos::hwmodel),
    entry(Flags::DISK_SIZE,          60, L,   false, true,  linux::disk_size),
    entry(Flags::VBOX_DEFAULT,       55, W,   false, true,  windows::vbox_default),
    entry(Flags::VBOX_NETWORK,       70, W,   false, true,  windows::vbox_network),
    entry(Flags::COMPUTER_NAME,      40, W,   false, true,  windows::computer_name),
    entry(Flags::HOSTNAME,           25, W,   false, true,  windows::hostname),
    entry(Flags::MEMORY,             35, W,   false, true,  windows::memory),
    entry(Flags::VM_PROCESSES,       30, W,   false, true,  windows::vm_processes),
    entry(Flags::LINUX_USER_HOST,    35, L,   false, true,  linux::user_host),
    entry(Flags::VBOX_WINDOW_CLASS,  10, W,   false, true,  windows::vbox_window_class),
    entry(Flags::WMIC,               60, W,   false, true,  windows::wmic),
    entry(Flags::GAMARUE,            40, W,   false, true,  windows::gamarue),
    entry(Flags::VMID_0X4,           90, LWM, false, true,  cpu::vmid_0x4),
    entry(Flags::PARALLELS_VM,       50, W,   false, true,  windows::parallels_vm),
    entry(Flags::RDTSC_VMEXIT,       25, LW,  false, true,  cpu::rdtsc_vmexit),
    entry(Flags::LOADED_DLLS,        75, W,   false, true,  windows::loaded_dlls),
    entry(Flags::QEMU_BRAND,        100, LWM, false, true,  cpu::qemu_brand),
    entry(Flags::BOCHS_CPU,          95, LWM, false, true,  cpu::bochs_cpu),
    entry(Flags::VPC_BOARD,          90, W,   false, true,  windows::vpc_board),
    entry(Flags::HYPERV_WMI,         80, W,   false, true,  windows::hyperv_wmi),
    entry(Flags::HYPERV_REG,         80, W,   false, true,  windows::hyperv_reg),
    entry(Flags::BIOS_SERIAL,        60, W,   false, true,  windows::bios_serial),
    entry(Flags::VBOX_FOLDERS,       45, W,   false, true,  windows::vbox_folders),
    entry(Flags::VBOX_MSSMBIOS,      75, W,   false, true,  windows::vbox_mssmbios),
    entry(Flags::MAC_HYPERTHREAD,    10, M,   false, true,  macos::hyperthread),
    entry(Flags::MAC_MEMSIZE,        30, M,   false, true,  macos::memsize),
    entry(Flags::MAC_IOKIT,          80, M,   false, true,  macos::iokit),
    entry(Flags::IOREG_GREP,         75, M,   false, true,  macos::ioreg_grep),
    entry(Flags::MAC_SIP,            85, M,   false, true,  macos::sip),
    entry(Flags::KVM_REG,            75, W,   false, true,  windows::kvm_reg),
    entry(Flags::KVM_DRIVERS,        55, W,   false, true,  windows::kvm_drivers),
    entry(Flags::KVM_DIRS,           55, W,   false, true,  windows::kvm_dirs),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TECHNIQUE_COUNT;

    #[test]
    fn every_technique_appears_exactly_once() {
        let mut seen = Flags::empty();
        for descriptor in &REGISTRY {
            assert!(
                descriptor.flag.is_single_technique(),
                "{:?} is not a single technique bit",
                descriptor.flag
            );
            assert!(
                !seen.intersects(descriptor.flag),
                "{:?} registered twice",
                descriptor.flag
            );
            seen |= descriptor.flag;
        }
        assert_eq!(seen, Flags::ALL_TECHNIQUES);
        assert_eq!(REGISTRY.len() as u32, TECHNIQUE_COUNT);
    }

    #[test]
    fn weights_stay_within_certainty_scale() {
        for descriptor in &REGISTRY {
            assert!(
                descriptor.weight <= 100,
                "{:?} weight {} exceeds 100",
                descriptor.flag,
                descriptor.weight
            );
        }
    }

    #[test]
    fn no_descriptor_has_an_empty_platform_set() {
        for descriptor in &REGISTRY {
            assert!(
                !descriptor.platforms.is_empty(),
                "{:?} is runnable nowhere",
                descriptor.flag
            );
        }
    }

    #[test]
    fn default_set_matches_default_mask() {
        let mut defaults = Flags::empty();
        for descriptor in &REGISTRY {
            if descriptor.default_set {
                defaults |= descriptor.flag;
            }
        }
        assert_eq!(defaults, Flags::DEFAULT);
    }

    #[test]
    fn cursor_is_the_only_non_default_probe() {
        for descriptor in &REGISTRY {
            assert_eq!(
                descriptor.default_set,
                descriptor.flag != Flags::CURSOR,
                "{:?} default membership is wrong",
                descriptor.flag
            );
        }
    }

    #[test]
    fn root_gating_is_limited_to_privileged_linux_tools() {
        for descriptor in &REGISTRY {
            let expected = descriptor.flag == Flags::DMIDECODE || descriptor.flag == Flags::DMESG;
            assert_eq!(descriptor.requires_root, expected);
        }
    }
}
