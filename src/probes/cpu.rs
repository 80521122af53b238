//! CPUID, RDTSC and IDT probes. All of these are x86-only and compile to
//! unconditional misses on other architectures.

use crate::brand::{Brand, Tally};

#[cfg(target_arch = "x86")]
use std::arch::x86::{__cpuid, _mm_lfence, _rdtsc};
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{__cpuid, _mm_lfence, _rdtsc};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use raw_cpuid::CpuId;

const HYPERVISOR_LEAF: u32 = 0x4000_0000;

/// Maps a CPUID vendor signature to the hypervisor publishing it.
fn classify_vendor(vendor: &str) -> Option<Brand> {
    let signatures = [
        ("VMwareVMware", Brand::VMware),
        ("VBoxVBoxVBox", Brand::VirtualBox),
        ("KVMKVMKVM", Brand::Kvm),
        ("TCGTCGTCGTCG", Brand::Qemu),
        ("Microsoft Hv", Brand::HyperV),
        ("MicrosoftXTA", Brand::MicrosoftXta),
        ("prl hyperv", Brand::Parallels),
        ("lrpepyh vr", Brand::Parallels),
        ("XenVMMXenVMM", Brand::XenHvm),
        ("ACRNACRNACRN", Brand::Acrn),
        ("QNXQVMBSQG", Brand::QnxHypervisor),
        ("bhyve bhyve", Brand::Bhyve),
    ];
    signatures
        .iter()
        .find(|(signature, _)| vendor.contains(signature))
        .map(|&(_, brand)| brand)
}

/// CPU manufacturer string from leaf 0 (EBX, EDX, ECX order).
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn base_vendor() -> String {
    let leaf = unsafe { __cpuid(0) };
    let mut bytes = [0u8; 12];
    bytes[0..4].copy_from_slice(&leaf.ebx.to_le_bytes());
    bytes[4..8].copy_from_slice(&leaf.edx.to_le_bytes());
    bytes[8..12].copy_from_slice(&leaf.ecx.to_le_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Hypervisor vendor string from leaf 0x40000000 (EBX, ECX, EDX order).
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn hypervisor_vendor() -> String {
    let leaf = unsafe { __cpuid(HYPERVISOR_LEAF) };
    let mut bytes = [0u8; 12];
    bytes[0..4].copy_from_slice(&leaf.ebx.to_le_bytes());
    bytes[4..8].copy_from_slice(&leaf.ecx.to_le_bytes());
    bytes[8..12].copy_from_slice(&leaf.edx.to_le_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn hypervisor_bit_set() -> bool {
    CpuId::new()
        .get_feature_info()
        .map_or(false, |features| features.has_hypervisor())
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn processor_brand() -> Option<String> {
    CpuId::new()
        .get_processor_brand_string()
        .map(|brand| brand.as_str().to_string())
}

/// Vendor signatures at leaf 0 and the hypervisor leaf.
pub(crate) fn vmid(tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let mut hit = false;
        if let Some(brand) = classify_vendor(&base_vendor()) {
            tally.vote(brand);
            hit = true;
        }
        if let Some(brand) = classify_vendor(&hypervisor_vendor()) {
            tally.vote(brand);
            hit = true;
        }
        hit
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = tally;
        false
    }
}

/// Vendor signature at the hypervisor leaf only.
pub(crate) fn vmid_0x4(tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if let Some(brand) = classify_vendor(&hypervisor_vendor()) {
            tally.vote(brand);
            return true;
        }
        false
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = tally;
        false
    }
}

/// VM product names leaking into the processor brand string.
pub(crate) fn brand(tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let brand = match processor_brand() {
            Some(brand) => brand,
            None => return false,
        };
        let markers = [
            ("QEMU", Brand::Qemu),
            ("KVM", Brand::Kvm),
            ("VirtualBox", Brand::VirtualBox),
            ("VBox", Brand::VirtualBox),
            ("Xen", Brand::XenHvm),
            ("Bochs", Brand::Bochs),
            ("Parallels", Brand::Parallels),
        ];
        let mut hit = false;
        for (marker, vm_brand) in markers {
            if brand.contains(marker) {
                tally.vote(vm_brand);
                hit = true;
            }
        }
        hit
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = tally;
        false
    }
}

/// CPUID leaf 1 ECX bit 31. Only ever set under a hypervisor.
pub(crate) fn hypervisor_bit(_tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        hypervisor_bit_set()
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// A populated response at the hypervisor leaf.
pub(crate) fn cpuid_0x4(_tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if !hypervisor_bit_set() {
            return false;
        }
        let leaf = unsafe { __cpuid(HYPERVISOR_LEAF) };
        leaf.eax != 0 || leaf.ebx != 0 || leaf.ecx != 0 || leaf.edx != 0
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// A printable vendor string at the hypervisor leaf, even one we cannot
/// attribute to a known product.
pub(crate) fn hypervisor_str(_tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if !hypervisor_bit_set() {
            return false;
        }
        let printable = hypervisor_vendor()
            .chars()
            .filter(|c| c.is_ascii_graphic())
            .count();
        printable >= 4
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// The brand string QEMU's emulated CPU reports under TCG.
pub(crate) fn qemu_brand(tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if processor_brand().is_some_and(|brand| brand.contains("QEMU Virtual CPU")) {
            tally.vote(Brand::Qemu);
            return true;
        }
        false
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = tally;
        false
    }
}

/// Bochs ships fixed brand strings for its emulated CPU models.
pub(crate) fn bochs_cpu(tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let brand = match processor_brand() {
            Some(brand) => brand,
            None => return false,
        };
        let defaults = [
            "              Intel(R) Pentium(R) 4 CPU        ",
            "AMD Athlon(tm) processor",
        ];
        if defaults.iter().any(|default| brand.trim_end() == default.trim_end()) {
            tally.vote(Brand::Bochs);
            return true;
        }
        false
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = tally;
        false
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn median(samples: &mut [u64]) -> u64 {
    samples.sort_unstable();
    samples[samples.len() / 2]
}

/// CPUID latency in TSC cycles. Trap-and-emulate makes the instruction an
/// order of magnitude slower than on bare metal. May false-positive on
/// power-throttled physical CPUs, which the low weight accounts for.
pub(crate) fn rdtsc(_tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        const SAMPLES: usize = 100;
        const TRIM: usize = 5;
        const THRESHOLD: u64 = 1000;
        let mut cycles = [0u64; SAMPLES + 2 * TRIM];
        for sample in cycles.iter_mut() {
            unsafe {
                _mm_lfence();
                let start = _rdtsc();
                _mm_lfence();
                let leaf = __cpuid(0);
                _mm_lfence();
                let end = _rdtsc();
                _mm_lfence();
                std::ptr::read_volatile(&leaf);
                *sample = end.wrapping_sub(start);
            }
        }
        cycles.sort_unstable();
        let trimmed = &cycles[TRIM..TRIM + SAMPLES];
        let average = trimmed.iter().sum::<u64>() / SAMPLES as u64;
        average > THRESHOLD
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// Ratio between a VM-exiting instruction (CPUID) and plain reads of the
/// TSC. Same caveat as `rdtsc`: runtime-variable, weighted low.
pub(crate) fn rdtsc_vmexit(_tally: &mut Tally) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        const SAMPLES: usize = 50;
        let mut exit_cycles = [0u64; SAMPLES];
        let mut plain_cycles = [0u64; SAMPLES];
        for i in 0..SAMPLES {
            unsafe {
                _mm_lfence();
                let start = _rdtsc();
                _mm_lfence();
                let leaf = __cpuid(0);
                _mm_lfence();
                let end = _rdtsc();
                _mm_lfence();
                std::ptr::read_volatile(&leaf);
                exit_cycles[i] = end.wrapping_sub(start);

                _mm_lfence();
                let start = _rdtsc();
                _mm_lfence();
                let end = _rdtsc();
                _mm_lfence();
                plain_cycles[i] = end.wrapping_sub(start);
            }
        }
        let exit_median = median(&mut exit_cycles);
        let plain_median = median(&mut plain_cycles).max(1);
        exit_median > 1500 || exit_median / plain_median > 40
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// IDT base relocation. Hypervisors commonly leave the most significant
/// byte of the guest IDT base zeroed, where bare-metal kernels map the IDT
/// into high canonical memory.
pub(crate) fn sidt5(_tally: &mut Tally) -> bool {
    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    {
        let mut idtr = [0u8; 10];
        unsafe {
            std::arch::asm!(
                "sidt [{0}]",
                in(reg) idtr.as_mut_ptr(),
                options(nostack, preserves_flags),
            );
        }
        idtr[9] == 0x00
    }
    #[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_signatures_map_to_brands() {
        assert_eq!(classify_vendor("VMwareVMware"), Some(Brand::VMware));
        assert_eq!(classify_vendor("KVMKVMKVM\0\0\0"), Some(Brand::Kvm));
        assert_eq!(classify_vendor(" lrpepyh vr"), Some(Brand::Parallels));
        assert_eq!(classify_vendor("bhyve bhyve "), Some(Brand::Bhyve));
        assert_eq!(classify_vendor("GenuineIntel"), None);
        assert_eq!(classify_vendor("AuthenticAMD"), None);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn timing_probes_return_without_panicking() {
        let mut tally = Tally::new();
        let _ = rdtsc(&mut tally);
        let _ = rdtsc_vmexit(&mut tally);
    }
}
