//! macOS probes, all backed by the stock sysctl/ioreg/csrutil utilities.

use crate::brand::{Brand, Tally};
use crate::probes::capture_output;

fn sysctl(key: &str) -> Option<String> {
    capture_output("sysctl", &["-n", key]).map(|value| value.trim().to_string())
}

fn sysctl_u64(key: &str) -> Option<u64> {
    sysctl(key)?.parse().ok()
}

/// `hw.model` on hardware is always a Mac model identifier; guests report
/// the virtualization product instead.
pub(crate) fn hwmodel(tally: &mut Tally) -> bool {
    let model = match sysctl("hw.model") {
        Some(model) => model,
        None => return false,
    };
    if model.is_empty() {
        return false;
    }
    let markers = [
        ("VMware", Brand::VMware),
        ("VirtualBox", Brand::VirtualBox),
        ("VBox", Brand::VirtualBox),
        ("Parallels", Brand::Parallels),
        ("VirtualMac", Brand::VirtualApple),
    ];
    for (marker, brand) in markers {
        if model.contains(marker) {
            tally.vote(brand);
            return true;
        }
    }
    !model.contains("Mac")
}

/// Virtual CPUs are usually presented without SMT.
pub(crate) fn hyperthread(_tally: &mut Tally) -> bool {
    match (sysctl_u64("hw.logicalcpu"), sysctl_u64("hw.physicalcpu")) {
        (Some(logical), Some(physical)) => logical == physical,
        _ => false,
    }
}

/// Round power-of-two memory sizes at or below 4 GiB match stock VM
/// allocations.
pub(crate) fn memsize(_tally: &mut Tally) -> bool {
    const GIB: u64 = 1024 * 1024 * 1024;
    match sysctl_u64("hw.memsize") {
        Some(bytes) => bytes == GIB || bytes == 2 * GIB || bytes == 4 * GIB,
        None => false,
    }
}

/// Guest additions and paravirtual devices leak into the IOKit registry.
pub(crate) fn iokit(tally: &mut Tally) -> bool {
    let output = match capture_output("ioreg", &["-l"]) {
        Some(output) => output,
        None => return false,
    };
    let markers = [
        ("VirtualBox", Brand::VirtualBox),
        ("VMware", Brand::VMware),
        ("Parallels", Brand::Parallels),
        ("Apple Virtualization", Brand::VirtualApple),
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

/// Platform expert device names the board manufacturer, which guests
/// cannot hide.
pub(crate) fn ioreg_grep(tally: &mut Tally) -> bool {
    let output = match capture_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"]) {
        Some(output) => output,
        None => return false,
    };
    let markers = [
        ("innotek GmbH", Brand::VirtualBox),
        ("VirtualBox", Brand::VirtualBox),
        ("VMware", Brand::VMware),
        ("Parallels", Brand::Parallels),
        ("VirtualMac", Brand::VirtualApple),
    ];
    for (marker, brand) in markers {
        if output.contains(marker) {
            tally.vote(brand);
            return true;
        }
    }
    false
}

/// System Integrity Protection is routinely switched off in analysis VMs
/// and almost never on end-user hardware.
pub(crate) fn sip(_tally: &mut Tally) -> bool {
    match capture_output("csrutil", &["status"]) {
        Some(status) => status.to_lowercase().contains("disabled"),
        None => false,
    }
}
