//! Probe implementations, grouped by the OS surface they read.
//!
//! Every probe has the same contract: read-only against the host, never
//! panics, and converts any internal failure into a `false` return. Probes
//! that recognize a specific product record a vote in the shared tally.

use crate::brand::{Brand, Tally};

pub(crate) mod cpu;

#[cfg(target_os = "linux")]
pub(crate) mod linux;
#[cfg(target_os = "macos")]
pub(crate) mod macos;
#[cfg(target_os = "windows")]
pub(crate) mod windows;

/// Logical CPU starvation. Single-vCPU guests are common for sandboxes,
/// rare for physical desktops.
pub(crate) fn threadcount(_tally: &mut Tally) -> bool {
    num_cpus::get() < 2
}

/// Checks network interface MAC addresses against the OUI prefixes
/// registered to VM vendors.
pub(crate) fn mac(tally: &mut Tally) -> bool {
    #[cfg(target_os = "linux")]
    {
        let entries = match std::fs::read_dir("/sys/class/net") {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        let mut hit = false;
        for entry in entries.flatten() {
            if let Ok(address) = std::fs::read_to_string(entry.path().join("address")) {
                if let Some(brand) = classify_mac(address.trim()) {
                    tally.vote(brand);
                    hit = true;
                }
            }
        }
        hit
    }
    #[cfg(target_os = "windows")]
    {
        windows::mac_address(tally)
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let _ = tally;
        false
    }
}

/// Maps a MAC address to the VM vendor owning its OUI prefix.
pub(crate) fn classify_mac(mac: &str) -> Option<Brand> {
    let mac = mac.to_ascii_lowercase();
    let vendor_prefixes = [
        ("00:05:69", Brand::VMware),
        ("00:0c:29", Brand::VMware),
        ("00:1c:14", Brand::VMware),
        ("00:50:56", Brand::VMware),
        ("08:00:27", Brand::VirtualBox),
        ("0a:00:27", Brand::VirtualBox),
        ("00:1c:42", Brand::Parallels),
        ("52:54:00", Brand::QemuKvm),
        ("00:16:3e", Brand::XenHvm),
    ];
    vendor_prefixes
        .iter()
        .find(|(prefix, _)| mac.starts_with(prefix))
        .map(|&(_, brand)| brand)
}

/// Whether the process runs with the privilege required by root-gated
/// probes. Root gating only applies on Unix platforms.
pub(crate) fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Runs a host utility and captures stdout, swallowing every failure mode
/// (missing binary, non-zero exit, non-UTF-8 output) into `None`.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub(crate) fn capture_output(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(not(target_os = "linux"))]
pub(crate) mod linux {
    use crate::brand::Tally;

    pub(crate) fn temperature(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn systemd(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn cvendor(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn ctype(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn dockerenv(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn dmidecode(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn dmesg(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn hwmon(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn user_host(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn disk_size(_: &mut Tally) -> bool {
        false
    }
}

#[cfg(not(target_os = "macos"))]
pub(crate) mod macos {
    use crate::brand::Tally;

    pub(crate) fn hwmodel(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn hyperthread(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn memsize(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn iokit(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn ioreg_grep(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn sip(_: &mut Tally) -> bool {
        false
    }
}

#[cfg(not(target_os = "windows"))]
pub(crate) mod windows {
    use crate::brand::Tally;

    pub(crate) fn cursor(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vmware_reg(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_reg(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn user(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn dll(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn registry(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn sunbelt_vm(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn wine_check(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vm_files(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_default(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_network(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn computer_name(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn hostname(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn memory(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vm_processes(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_window_class(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn wmic(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn gamarue(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn parallels_vm(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn loaded_dlls(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vpc_board(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn hyperv_wmi(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn hyperv_reg(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn bios_serial(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_folders(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn vbox_mssmbios(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn kvm_reg(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn kvm_drivers(_: &mut Tally) -> bool {
        false
    }
    pub(crate) fn kvm_dirs(_: &mut Tally) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_prefix_classification() {
        assert_eq!(classify_mac("08:00:27:aa:bb:cc"), Some(Brand::VirtualBox));
        assert_eq!(classify_mac("00:50:56:01:02:03"), Some(Brand::VMware));
        assert_eq!(classify_mac("52:54:00:12:34:56"), Some(Brand::QemuKvm));
        assert_eq!(classify_mac("00:1C:42:00:00:01"), Some(Brand::Parallels));
        assert_eq!(classify_mac("3c:22:fb:9a:00:01"), None);
        assert_eq!(classify_mac(""), None);
    }
}
