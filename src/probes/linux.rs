//! Linux probes: DMI/sysfs reads, container markers and host utilities.

use std::ffi::CString;
use std::path::Path;

use crate::brand::{Brand, Tally};
use crate::probes::capture_output;

fn dmi_field(name: &str) -> Option<String> {
    let path = format!("/sys/devices/virtual/dmi/id/{name}");
    std::fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
}

/// Physical machines expose thermal zones; most hypervisors do not bother
/// emulating them.
pub(crate) fn temperature(_tally: &mut Tally) -> bool {
    !Path::new("/sys/class/thermal/thermal_zone0").exists()
}

/// Asks systemd's own virtualization detector and maps its answer.
pub(crate) fn systemd(tally: &mut Tally) -> bool {
    let output = match capture_output("systemd-detect-virt", &[]) {
        Some(output) => output,
        None => return false,
    };
    let answer = output.trim();
    if answer.is_empty() || answer == "none" {
        return false;
    }
    let brand = match answer {
        "kvm" => Brand::Kvm,
        "qemu" => Brand::Qemu,
        "vmware" => Brand::VMware,
        "oracle" => Brand::VirtualBox,
        "microsoft" => Brand::HyperV,
        "xen" => Brand::XenHvm,
        "parallels" => Brand::Parallels,
        "bochs" => Brand::Bochs,
        "acrn" => Brand::Acrn,
        "qnx" => Brand::QnxHypervisor,
        "bhyve" => Brand::Bhyve,
        "apple" => Brand::VirtualApple,
        "docker" => Brand::Docker,
        _ => Brand::Unknown,
    };
    tally.vote(brand);
    true
}

/// DMI chassis vendor strings planted by guest firmware.
pub(crate) fn cvendor(tally: &mut Tally) -> bool {
    let vendor = match dmi_field("chassis_vendor") {
        Some(vendor) => vendor,
        None => return false,
    };
    let markers = [
        ("QEMU", Brand::Qemu),
        ("Oracle", Brand::VirtualBox),
        ("VMware", Brand::VMware),
        ("Xen", Brand::XenHvm),
        ("Parallels", Brand::Parallels),
        ("Microsoft", Brand::HyperV),
    ];
    for (marker, brand) in markers {
        if vendor.contains(marker) {
            tally.vote(brand);
            return true;
        }
    }
    false
}

/// Chassis type 1 ("Other") is what most hypervisors report instead of a
/// real enclosure type.
pub(crate) fn ctype(_tally: &mut Tally) -> bool {
    dmi_field("chassis_type").is_some_and(|chassis| chassis == "1")
}

/// Container runtime markers dropped at the filesystem root.
pub(crate) fn dockerenv(tally: &mut Tally) -> bool {
    if Path::new("/.dockerenv").exists() || Path::new("/.dockerinit").exists() {
        tally.vote(Brand::Docker);
        return true;
    }
    false
}

/// Scans full SMBIOS tables via dmidecode. Needs root, hence gated by the
/// registry.
pub(crate) fn dmidecode(tally: &mut Tally) -> bool {
    let output = match capture_output("dmidecode", &[]) {
        Some(output) => output.to_uppercase(),
        None => return false,
    };
    let markers = [
        ("QEMU", Brand::Qemu),
        ("VIRTUALBOX", Brand::VirtualBox),
        ("VBOX", Brand::VirtualBox),
        ("KVM", Brand::Kvm),
        ("VMWARE", Brand::VMware),
        ("XEN", Brand::XenHvm),
        ("BOCHS", Brand::Bochs),
        ("PARALLELS", Brand::Parallels),
    ];
    let mut hit = false;
    for (marker, brand) in markers {
        if output.contains(marker) {
            tally.vote(brand);
            hit = true;
        }
    }
    hit
}

/// Kernel ring buffer notes the hypervisor it booted under.
pub(crate) fn dmesg(tally: &mut Tally) -> bool {
    let output = match capture_output("dmesg", &[]) {
        Some(output) => output,
        None => return false,
    };
    if !output.contains("Hypervisor detected") {
        return false;
    }
    let markers = [
        ("KVM", Brand::Kvm),
        ("QEMU", Brand::Qemu),
        ("VMware", Brand::VMware),
        ("Microsoft Hyper-V", Brand::HyperV),
        ("Xen", Brand::XenHvm),
    ];
    for (marker, brand) in markers {
        if output.contains(marker) {
            tally.vote(brand);
            break;
        }
    }
    true
}

/// Hardware monitoring sensors exist on physical boards and are absent in
/// most guests.
pub(crate) fn hwmon(_tally: &mut Tally) -> bool {
    match std::fs::read_dir("/sys/class/hwmon") {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

/// Default account/hostname pairs of throwaway analysis images.
pub(crate) fn user_host(_tally: &mut Tally) -> bool {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_default()
        .to_lowercase();
    let host = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let suspect_users = ["sandbox", "currentuser", "malware", "maltest", "virus"];
    let suspect_hosts = ["sandbox", "cuckoo", "analysis", "malware"];
    suspect_users.contains(&user.as_str()) || suspect_hosts.contains(&host.as_str())
}

/// Root filesystems under 80 GiB match stock VM disk allocations far more
/// often than physical installs.
pub(crate) fn disk_size(_tally: &mut Tally) -> bool {
    const THRESHOLD_BYTES: u64 = 80 * 1024 * 1024 * 1024;
    let root = match CString::new("/") {
        Ok(root) => root,
        Err(_) => return false,
    };
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(root.as_ptr(), &mut stats) } != 0 {
        return false;
    }
    let total = (stats.f_blocks as u64).saturating_mul(stats.f_frsize as u64);
    total != 0 && total < THRESHOLD_BYTES
}
