//! Windows probes: registry artifacts, WMI inventory, loaded modules,
//! guest-tool files and desktop heuristics.

use std::ffi::{c_void, OsStr};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use windows::core::{s, PCSTR, PCWSTR, PWSTR};
use windows::Win32::Foundation::POINT;
use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;
use windows::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
use windows::Win32::System::Registry::{
    RegCloseKey, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
    KEY_READ, RRF_RT_REG_SZ,
};
use windows::Win32::System::SystemInformation::{
    ComputerNameDnsHostname, ComputerNameNetBIOS, GetComputerNameExW, GlobalMemoryStatusEx,
    COMPUTER_NAME_FORMAT, MEMORYSTATUSEX,
};
use windows::Win32::System::WindowsProgramming::GetUserNameW;
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowA, GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
};
use wmi::{COMLibrary, WMIConnection};

use crate::brand::{Brand, Tally};
use crate::probes::classify_mac;

const GIB: u64 = 1024 * 1024 * 1024;

fn to_pcwstr(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn wmi_query<T>() -> Option<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    let com_lib = COMLibrary::new().ok()?;
    let wmi_con = WMIConnection::new(com_lib.into()).ok()?;
    wmi_con.query().ok()
}

fn key_exists(root: HKEY, path: &str) -> bool {
    let sub_key = to_pcwstr(path);
    let mut key_handle: HKEY = HKEY(0);
    let opened = unsafe {
        RegOpenKeyExW(root, PCWSTR(sub_key.as_ptr()), 0, KEY_READ, &mut key_handle)
    };
    if opened.is_ok() {
        unsafe {
            let _ = RegCloseKey(key_handle);
        }
        true
    } else {
        false
    }
}

fn reg_string_value(root: HKEY, path: &str, value: &str) -> Option<String> {
    let sub_key = to_pcwstr(path);
    let value_name = to_pcwstr(value);
    let mut buffer = [0u16; 1024];
    let mut size = (buffer.len() * 2) as u32;
    let read = unsafe {
        RegGetValueW(
            root,
            PCWSTR(sub_key.as_ptr()),
            PCWSTR(value_name.as_ptr()),
            RRF_RT_REG_SZ,
            Some(std::ptr::null_mut()),
            Some(buffer.as_mut_ptr() as *mut c_void),
            Some(&mut size),
        )
    };
    if read.is_err() {
        return None;
    }
    let chars = ((size / 2) as usize).min(buffer.len());
    Some(
        String::from_utf16_lossy(&buffer[..chars])
            .trim_end_matches('\0')
            .to_string(),
    )
}

fn computer_name_string(format: COMPUTER_NAME_FORMAT) -> Option<String> {
    let mut buffer = [0u16; 256];
    let mut size = buffer.len() as u32;
    unsafe {
        GetComputerNameExW(format, PWSTR(buffer.as_mut_ptr()), &mut size).ok()?;
    }
    Some(String::from_utf16_lossy(&buffer[..size as usize]))
}

/// Waits five seconds for the cursor to move. Idle cursors are the norm in
/// automated analysis and the exception on a desktop in use. Excluded from
/// the default set because of the blocking wait.
pub(crate) fn cursor(_tally: &mut Tally) -> bool {
    let mut first = POINT::default();
    let mut second = POINT::default();
    unsafe {
        if GetCursorPos(&mut first).is_err() {
            return false;
        }
    }
    thread::sleep(Duration::from_secs(5));
    unsafe {
        if GetCursorPos(&mut second).is_err() {
            return false;
        }
    }
    first.x == second.x && first.y == second.y
}

/// Registry keys installed by VMware Tools.
pub(crate) fn vmware_reg(tally: &mut Tally) -> bool {
    let hklm_keys = [
        "SOFTWARE\\VMware, Inc.\\VMware Tools",
        "SYSTEM\\ControlSet001\\Services\\vmdebug",
        "SYSTEM\\ControlSet001\\Services\\vmmouse",
        "SYSTEM\\ControlSet001\\Services\\VMTools",
        "SYSTEM\\ControlSet001\\Services\\VMMEMCTL",
    ];
    let mut hit = false;
    for key in hklm_keys {
        if key_exists(HKEY_LOCAL_MACHINE, key) {
            tally.vote(Brand::VMware);
            hit = true;
        }
    }
    if key_exists(HKEY_CURRENT_USER, "SOFTWARE\\VMware, Inc.") {
        tally.vote(Brand::VMware);
        hit = true;
    }
    hit
}

/// Registry keys installed by the VirtualBox Guest Additions.
pub(crate) fn vbox_reg(tally: &mut Tally) -> bool {
    let hklm_keys = [
        "SOFTWARE\\Oracle\\VirtualBox Guest Additions",
        "SYSTEM\\ControlSet001\\Services\\VBoxGuest",
        "SYSTEM\\ControlSet001\\Services\\VBoxMouse",
        "SYSTEM\\ControlSet001\\Services\\VBoxService",
        "SYSTEM\\ControlSet001\\Services\\VBoxSF",
        "SYSTEM\\ControlSet001\\Services\\VBoxVideo",
    ];
    let mut hit = false;
    for key in hklm_keys {
        if key_exists(HKEY_LOCAL_MACHINE, key) {
            tally.vote(Brand::VirtualBox);
            hit = true;
        }
    }
    hit
}

/// Checks the logged-in account against names baked into public sandbox
/// images.
pub(crate) fn user(tally: &mut Tally) -> bool {
    let mut buffer = [0u16; 256];
    let mut size = buffer.len() as u32;
    let username = unsafe {
        if GetUserNameW(PWSTR(buffer.as_mut_ptr()), &mut size).is_ok() {
            String::from_utf16_lossy(&buffer[..size.saturating_sub(1) as usize])
        } else {
            return false;
        }
    };
    let accounts: [(&str, Option<Brand>); 11] = [
        ("WDAGUtilityAccount", None),
        ("CurrentUser", None),
        ("Sandbox", None),
        ("sand box", None),
        ("HAPUBWS", Some(Brand::HybridAnalysis)),
        ("maltest", None),
        ("malware", None),
        ("virus", None),
        ("John Doe", None),
        ("Emily", None),
        ("timmy", None),
    ];
    for (account, brand) in accounts {
        if username.eq_ignore_ascii_case(account) {
            if let Some(brand) = brand {
                tally.vote(brand);
            }
            return true;
        }
    }
    false
}

/// Analysis products inject their instrumentation DLLs into every process.
pub(crate) fn dll(tally: &mut Tally) -> bool {
    let modules: [(PCSTR, Option<Brand>); 8] = [
        (s!("sbiedll.dll"), Some(Brand::Sandboxie)),
        (s!("cmdvrt32.dll"), Some(Brand::Comodo)),
        (s!("cmdvrt64.dll"), Some(Brand::Comodo)),
        (s!("vmcheck.dll"), Some(Brand::VirtualPc)),
        (s!("pstorec.dll"), Some(Brand::SunBelt)),
        (s!("api_log.dll"), None),
        (s!("dir_watch.dll"), None),
        (s!("wpespy.dll"), None),
    ];
    let mut hit = false;
    for (module, brand) in modules {
        if unsafe { GetModuleHandleA(module) }.is_ok() {
            if let Some(brand) = brand {
                tally.vote(brand);
            }
            hit = true;
        }
    }
    hit
}

/// Broad sweep over registry keys that only exist inside guests.
pub(crate) fn registry(tally: &mut Tally) -> bool {
    let hklm_keys: [(&str, Brand); 20] = [
        ("HARDWARE\\ACPI\\DSDT\\VBOX__", Brand::VirtualBox),
        ("HARDWARE\\ACPI\\FADT\\VBOX__", Brand::VirtualBox),
        ("HARDWARE\\ACPI\\RSDT\\VBOX__", Brand::VirtualBox),
        ("SOFTWARE\\Oracle\\VirtualBox Guest Additions", Brand::VirtualBox),
        ("SYSTEM\\ControlSet001\\Services\\VBoxGuest", Brand::VirtualBox),
        ("SYSTEM\\ControlSet001\\Services\\VBoxMouse", Brand::VirtualBox),
        ("SYSTEM\\ControlSet001\\Services\\VBoxSF", Brand::VirtualBox),
        ("SYSTEM\\ControlSet001\\Services\\VBoxVideo", Brand::VirtualBox),
        ("SOFTWARE\\VMware, Inc.\\VMware Tools", Brand::VMware),
        ("SYSTEM\\ControlSet001\\Services\\vmdebug", Brand::VMware),
        ("SYSTEM\\ControlSet001\\Services\\vmmouse", Brand::VMware),
        ("SYSTEM\\ControlSet001\\Services\\VMMEMCTL", Brand::VMware),
        ("HARDWARE\\ACPI\\DSDT\\xen", Brand::XenHvm),
        ("HARDWARE\\ACPI\\FADT\\xen", Brand::XenHvm),
        ("SYSTEM\\ControlSet001\\Services\\xenevtchn", Brand::XenHvm),
        ("SYSTEM\\ControlSet001\\Services\\xennet", Brand::XenHvm),
        ("SOFTWARE\\Wine", Brand::Wine),
        ("SYSTEM\\ControlSet001\\Services\\vpc-s3", Brand::VirtualPc),
        ("SYSTEM\\ControlSet001\\Services\\vpcbus", Brand::VirtualPc),
        ("SYSTEM\\ControlSet001\\Services\\msvmmouf", Brand::VirtualPc),
    ];
    let mut hit = false;
    for (key, brand) in hklm_keys {
        if key_exists(HKEY_LOCAL_MACHINE, key) {
            tally.vote(brand);
            hit = true;
        }
    }
    if key_exists(HKEY_CURRENT_USER, "SOFTWARE\\Wine") {
        tally.vote(Brand::Wine);
        hit = true;
    }
    hit
}

/// Sunbelt/GFI sandbox drops its working directory at the drive root.
pub(crate) fn sunbelt_vm(tally: &mut Tally) -> bool {
    if Path::new("C:\\analysis").exists() {
        tally.vote(Brand::SunBelt);
        return true;
    }
    false
}

/// Wine implements kernel32 with extra exports no real Windows has.
pub(crate) fn wine_check(tally: &mut Tally) -> bool {
    let kernel32 = match unsafe { GetModuleHandleA(s!("kernel32.dll")) } {
        Ok(handle) => handle,
        Err(_) => return false,
    };
    if unsafe { GetProcAddress(kernel32, s!("wine_get_unix_file_name")) }.is_some() {
        tally.vote(Brand::Wine);
        return true;
    }
    false
}

/// Guest driver binaries left under System32.
pub(crate) fn vm_files(tally: &mut Tally) -> bool {
    let driver_files: [(&str, Brand); 9] = [
        ("C:\\Windows\\System32\\drivers\\vmmouse.sys", Brand::VMware),
        ("C:\\Windows\\System32\\drivers\\vmhgfs.sys", Brand::VMware),
        ("C:\\Windows\\System32\\drivers\\vmmemctl.sys", Brand::VMware),
        ("C:\\Windows\\System32\\drivers\\vmrawdsk.sys", Brand::VMware),
        ("C:\\Windows\\System32\\drivers\\vmusbmouse.sys", Brand::VMware),
        ("C:\\Windows\\System32\\drivers\\VBoxMouse.sys", Brand::VirtualBox),
        ("C:\\Windows\\System32\\drivers\\VBoxGuest.sys", Brand::VirtualBox),
        ("C:\\Windows\\System32\\drivers\\VBoxSF.sys", Brand::VirtualBox),
        ("C:\\Windows\\System32\\drivers\\VBoxVideo.sys", Brand::VirtualBox),
    ];
    let mut hit = false;
    for (file, brand) in driver_files {
        if Path::new(file).exists() {
            tally.vote(brand);
            hit = true;
        }
    }
    hit
}

/// The stock VirtualBox hardware profile: small screen, small memory,
/// small disk. Two of the three together are a strong tell.
pub(crate) fn vbox_default(tally: &mut Tally) -> bool {
    let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    let mut mem_status = MEMORYSTATUSEX {
        dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
        ..Default::default()
    };
    let mut total_disk: u64 = 0;
    unsafe {
        let _ = GlobalMemoryStatusEx(&mut mem_status);
        let drive = to_pcwstr("C:\\");
        let _ = GetDiskFreeSpaceExW(PCWSTR(drive.as_ptr()), None, Some(&mut total_disk), None);
    }
    let mut points = 0;
    let small_screen = matches!((width, height), (800, 600) | (1024, 768) | (1152, 864));
    if small_screen {
        points += 1;
    }
    if mem_status.ullTotalPhys > 0 && mem_status.ullTotalPhys <= 4 * GIB {
        points += 1;
    }
    if total_disk > 0 && total_disk <= 100 * GIB {
        points += 1;
    }
    if points >= 2 {
        tally.vote(Brand::VirtualBox);
        return true;
    }
    false
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_NetworkAdapter")]
#[serde(rename_all = "PascalCase")]
struct Win32NetworkAdapter {
    name: Option<String>,
}

/// Host-only adapters VirtualBox injects into the guest.
pub(crate) fn vbox_network(tally: &mut Tally) -> bool {
    let adapters: Vec<Win32NetworkAdapter> = match wmi_query() {
        Some(adapters) => adapters,
        None => return false,
    };
    for adapter in adapters {
        if let Some(name) = &adapter.name {
            if name.contains("VirtualBox") {
                tally.vote(Brand::VirtualBox);
                return true;
            }
        }
    }
    false
}

/// Machine names hard-coded into published analysis images.
pub(crate) fn computer_name(tally: &mut Tally) -> bool {
    let name = match computer_name_string(ComputerNameNetBIOS) {
        Some(name) => name,
        None => return false,
    };
    let known_names: [(&str, Option<Brand>); 10] = [
        ("InsideTm", Some(Brand::ThreadExpert)),
        ("TU-4NH09SMCG1HC", Some(Brand::Anubis)),
        ("klone_x64-pc", None),
        ("BEE7370C-8C0C-4", None),
        ("DESKTOP-NAKFFMT", None),
        ("WIN-5E07COS9ALR", None),
        ("B30F0242-1C6A-4", None),
        ("DESKTOP-VRSQLAG", None),
        ("Q9IATRKPRH", None),
        ("XC64ZB", None),
    ];
    for (known, brand) in known_names {
        if name.eq_ignore_ascii_case(known) {
            if let Some(brand) = brand {
                tally.vote(brand);
            }
            return true;
        }
    }
    false
}

/// DNS hostnames from the same image catalogs.
pub(crate) fn hostname(_tally: &mut Tally) -> bool {
    let name = match computer_name_string(ComputerNameDnsHostname) {
        Some(name) => name,
        None => return false,
    };
    let known_hosts = ["SystemIT", "WIN7-TRAPS", "PC-DANIELE", "WIN-56G04BLIN5T"];
    known_hosts
        .iter()
        .any(|known| name.eq_ignore_ascii_case(known))
}

/// Sandboxes are routinely provisioned with less memory than any modern
/// physical machine ships with.
pub(crate) fn memory(_tally: &mut Tally) -> bool {
    let mut mem_status = MEMORYSTATUSEX {
        dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
        ..Default::default()
    };
    unsafe {
        if GlobalMemoryStatusEx(&mut mem_status).is_err() {
            return false;
        }
    }
    mem_status.ullTotalPhys > 0 && mem_status.ullTotalPhys < 2 * GIB
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_Process")]
#[serde(rename_all = "PascalCase")]
struct Win32Process {
    name: String,
}

/// Guest tool and sandbox agent processes.
pub(crate) fn vm_processes(tally: &mut Tally) -> bool {
    let processes: Vec<Win32Process> = match wmi_query() {
        Some(processes) => processes,
        None => return false,
    };
    let agents: [(&str, Brand); 17] = [
        ("vmtoolsd.exe", Brand::VMware),
        ("vmwaretray.exe", Brand::VMware),
        ("vmwareuser.exe", Brand::VMware),
        ("VGAuthService.exe", Brand::VMware),
        ("vmacthlp.exe", Brand::VMware),
        ("vboxservice.exe", Brand::VirtualBox),
        ("vboxtray.exe", Brand::VirtualBox),
        ("qemu-ga.exe", Brand::Qemu),
        ("qga.exe", Brand::Qemu),
        ("vdagent.exe", Brand::Qemu),
        ("vdservice.exe", Brand::Qemu),
        ("prl_cc.exe", Brand::Parallels),
        ("prl_tools.exe", Brand::Parallels),
        ("vmsrvc.exe", Brand::VirtualPc),
        ("vpcmap.exe", Brand::VirtualPc),
        ("joeboxserver.exe", Brand::JoeBox),
        ("joeboxcontrol.exe", Brand::JoeBox),
    ];
    let mut hit = false;
    for process in &processes {
        for (agent, brand) in agents {
            if process.name.eq_ignore_ascii_case(agent) {
                tally.vote(brand);
                hit = true;
            }
        }
    }
    hit
}

/// The VirtualBox tray tool registers a well-known window class.
pub(crate) fn vbox_window_class(tally: &mut Tally) -> bool {
    let by_class = unsafe { FindWindowA(s!("VBoxTrayToolWndClass"), PCSTR::null()) };
    let by_name = unsafe { FindWindowA(PCSTR::null(), s!("VBoxTrayToolWnd")) };
    if by_class.0 != 0 || by_name.0 != 0 {
        tally.vote(Brand::VirtualBox);
        return true;
    }
    false
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_ComputerSystem")]
#[serde(rename_all = "PascalCase")]
struct Win32ComputerSystem {
    manufacturer: Option<String>,
    model: Option<String>,
}

/// Computer-system inventory strings set by guest firmware.
pub(crate) fn wmic(tally: &mut Tally) -> bool {
    let systems: Vec<Win32ComputerSystem> = match wmi_query() {
        Some(systems) => systems,
        None => return false,
    };
    let markers = [
        ("INNOTEK GMBH", Brand::VirtualBox),
        ("VIRTUALBOX", Brand::VirtualBox),
        ("VMWARE", Brand::VMware),
        ("QEMU", Brand::Qemu),
        ("XEN", Brand::XenHvm),
        ("PARALLELS", Brand::Parallels),
        ("BOCHS", Brand::Bochs),
    ];
    let mut hit = false;
    for system in &systems {
        for field in [&system.manufacturer, &system.model] {
            let Some(value) = field else { continue };
            let value = value.to_uppercase();
            for (marker, brand) in markers {
                if value.contains(marker) {
                    tally.vote(brand);
                    hit = true;
                }
            }
        }
    }
    hit
}

/// Windows product IDs that ship with specific public sandboxes.
pub(crate) fn gamarue(tally: &mut Tally) -> bool {
    let product_id = match reg_string_value(
        HKEY_LOCAL_MACHINE,
        "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion",
        "ProductId",
    ) {
        Some(product_id) => product_id,
        None => return false,
    };
    let sandbox_ids = [
        ("76487-337-8429955-22614", Brand::Anubis),
        ("76487-644-3177037-23510", Brand::CwSandbox),
        ("55274-640-2673064-23950", Brand::JoeBox),
    ];
    for (id, brand) in sandbox_ids {
        if product_id == id {
            tally.vote(brand);
            return true;
        }
    }
    false
}

/// Parallels reports itself in the computer-system inventory.
pub(crate) fn parallels_vm(tally: &mut Tally) -> bool {
    let systems: Vec<Win32ComputerSystem> = match wmi_query() {
        Some(systems) => systems,
        None => return false,
    };
    for system in &systems {
        for field in [&system.manufacturer, &system.model] {
            if field
                .as_deref()
                .is_some_and(|value| value.contains("Parallels"))
            {
                tally.vote(Brand::Parallels);
                return true;
            }
        }
    }
    false
}

/// Guest integration libraries installed into System32.
pub(crate) fn loaded_dlls(tally: &mut Tally) -> bool {
    let libraries: [(&str, Brand); 5] = [
        ("C:\\Windows\\System32\\vmGuestLib.dll", Brand::VMware),
        ("C:\\Windows\\System32\\VBoxMRXNP.dll", Brand::VirtualBox),
        ("C:\\Windows\\System32\\VBoxHook.dll", Brand::VirtualBox),
        ("C:\\Windows\\System32\\vmbusres.dll", Brand::HyperV),
        ("C:\\Windows\\System32\\SbieDll.dll", Brand::Sandboxie),
    ];
    let mut hit = false;
    for (library, brand) in libraries {
        if Path::new(library).exists() {
            tally.vote(brand);
            hit = true;
        }
    }
    hit
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_BaseBoard")]
#[serde(rename_all = "PascalCase")]
struct Win32BaseBoard {
    manufacturer: Option<String>,
    product: Option<String>,
}

/// Virtual PC's synthetic baseboard.
pub(crate) fn vpc_board(tally: &mut Tally) -> bool {
    let boards: Vec<Win32BaseBoard> = match wmi_query() {
        Some(boards) => boards,
        None => return false,
    };
    for board in &boards {
        let microsoft = board
            .manufacturer
            .as_deref()
            .is_some_and(|value| value.contains("Microsoft"));
        let virtual_machine = board
            .product
            .as_deref()
            .is_some_and(|value| value.contains("Virtual Machine"));
        if microsoft && virtual_machine {
            tally.vote(Brand::VirtualPc);
            return true;
        }
    }
    false
}

/// Hyper-V guests carry Microsoft's "Virtual Machine" system profile.
pub(crate) fn hyperv_wmi(tally: &mut Tally) -> bool {
    let systems: Vec<Win32ComputerSystem> = match wmi_query() {
        Some(systems) => systems,
        None => return false,
    };
    for system in &systems {
        let microsoft = system
            .manufacturer
            .as_deref()
            .is_some_and(|value| value.contains("Microsoft Corporation"));
        let virtual_machine = system
            .model
            .as_deref()
            .is_some_and(|value| value.contains("Virtual Machine"));
        if microsoft && virtual_machine {
            tally.vote(Brand::HyperV);
            return true;
        }
    }
    false
}

/// Integration service keys present in every Hyper-V guest.
pub(crate) fn hyperv_reg(tally: &mut Tally) -> bool {
    let hklm_keys = [
        "SOFTWARE\\Microsoft\\Virtual Machine\\Guest\\Parameters",
        "SYSTEM\\ControlSet001\\Services\\vmicheartbeat",
        "SYSTEM\\ControlSet001\\Services\\vmicvss",
        "SYSTEM\\ControlSet001\\Services\\vmicshutdown",
        "SYSTEM\\ControlSet001\\Services\\vmicexchange",
    ];
    for key in hklm_keys {
        if key_exists(HKEY_LOCAL_MACHINE, key) {
            tally.vote(Brand::HyperV);
            return true;
        }
    }
    false
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_BIOS")]
#[serde(rename_all = "PascalCase")]
struct Win32Bios {
    #[serde(rename = "SerialNumber")]
    serial_number: Option<String>,
    #[serde(rename = "Version")]
    version: Option<String>,
}

/// BIOS serial and version strings planted by guest firmware.
pub(crate) fn bios_serial(tally: &mut Tally) -> bool {
    let entries: Vec<Win32Bios> = match wmi_query() {
        Some(entries) => entries,
        None => return false,
    };
    let mut hit = false;
    for bios in &entries {
        if let Some(serial) = &bios.serial_number {
            if serial.starts_with("VMware-") {
                tally.vote(Brand::VMware);
                hit = true;
            } else if serial.contains("VirtualBox") {
                tally.vote(Brand::VirtualBox);
                hit = true;
            } else if serial.contains("Parallels") {
                tally.vote(Brand::Parallels);
                hit = true;
            } else if serial == "0" {
                hit = true;
            }
        }
        if let Some(version) = &bios.version {
            let version = version.to_uppercase();
            let markers = [
                ("VBOX", Brand::VirtualBox),
                ("QEMU", Brand::Qemu),
                ("BOCHS", Brand::Bochs),
                ("VRTUAL", Brand::HyperV),
            ];
            for (marker, brand) in markers {
                if version.contains(marker) {
                    tally.vote(brand);
                    hit = true;
                }
            }
        }
    }
    hit
}

/// Guest Additions install directories.
pub(crate) fn vbox_folders(tally: &mut Tally) -> bool {
    let folders = [
        "C:\\Program Files\\Oracle\\VirtualBox Guest Additions",
        "C:\\Program Files (x86)\\Oracle\\VirtualBox Guest Additions",
    ];
    for folder in folders {
        if Path::new(folder).exists() {
            tally.vote(Brand::VirtualBox);
            return true;
        }
    }
    false
}

/// VirtualBox firmware strings mirrored into the hardware description
/// registry tree.
pub(crate) fn vbox_mssmbios(tally: &mut Tally) -> bool {
    let values = ["SystemBiosVersion", "VideoBiosVersion"];
    for value in values {
        if let Some(data) =
            reg_string_value(HKEY_LOCAL_MACHINE, "HARDWARE\\DESCRIPTION\\System", value)
        {
            let data = data.to_uppercase();
            if data.contains("VBOX") || data.contains("VIRTUALBOX") {
                tally.vote(Brand::VirtualBox);
                return true;
            }
        }
    }
    false
}

/// VirtIO guest service registrations.
pub(crate) fn kvm_reg(tally: &mut Tally) -> bool {
    let services = [
        "SYSTEM\\ControlSet001\\Services\\vioscsi",
        "SYSTEM\\ControlSet001\\Services\\viostor",
        "SYSTEM\\ControlSet001\\Services\\VirtIO-FS Service",
        "SYSTEM\\ControlSet001\\Services\\VirtioSerial",
        "SYSTEM\\ControlSet001\\Services\\BALLOON",
        "SYSTEM\\ControlSet001\\Services\\BalloonService",
        "SYSTEM\\ControlSet001\\Services\\netkvm",
    ];
    for service in services {
        if key_exists(HKEY_LOCAL_MACHINE, service) {
            tally.vote(Brand::Kvm);
            return true;
        }
    }
    false
}

/// VirtIO driver binaries.
pub(crate) fn kvm_drivers(tally: &mut Tally) -> bool {
    let drivers = [
        "C:\\Windows\\System32\\drivers\\balloon.sys",
        "C:\\Windows\\System32\\drivers\\netkvm.sys",
        "C:\\Windows\\System32\\drivers\\pvpanic.sys",
        "C:\\Windows\\System32\\drivers\\viofs.sys",
        "C:\\Windows\\System32\\drivers\\viogpudo.sys",
        "C:\\Windows\\System32\\drivers\\vioinput.sys",
        "C:\\Windows\\System32\\drivers\\viorng.sys",
        "C:\\Windows\\System32\\drivers\\vioscsi.sys",
        "C:\\Windows\\System32\\drivers\\vioser.sys",
        "C:\\Windows\\System32\\drivers\\viostor.sys",
    ];
    for driver in drivers {
        if Path::new(driver).exists() {
            tally.vote(Brand::Kvm);
            return true;
        }
    }
    false
}

/// VirtIO-Win and QEMU guest agent install directories.
pub(crate) fn kvm_dirs(tally: &mut Tally) -> bool {
    let directories = [
        "C:\\Program Files\\Virtio-Win",
        "C:\\Program Files\\KVM",
        "C:\\Program Files\\qemu-ga",
    ];
    for directory in directories {
        if Path::new(directory).exists() {
            tally.vote(Brand::Kvm);
            return true;
        }
    }
    false
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_NetworkAdapterConfiguration")]
#[serde(rename_all = "PascalCase")]
struct Win32NetworkAdapterConfiguration {
    #[serde(rename = "MACAddress")]
    mac_address: Option<String>,
}

/// MAC OUI scan over the adapter configuration table.
pub(crate) fn mac_address(tally: &mut Tally) -> bool {
    let adapters: Vec<Win32NetworkAdapterConfiguration> = match wmi_query() {
        Some(adapters) => adapters,
        None => return false,
    };
    let mut hit = false;
    for adapter in &adapters {
        if let Some(mac) = &adapter.mac_address {
            if let Some(brand) = classify_mac(mac) {
                tally.vote(brand);
                hit = true;
            }
        }
    }
    hit
}
