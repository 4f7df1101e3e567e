mod common;

use xa::{
    Ma, Pa, ProcessId, Va, XaCore, XaError, XaSession,
    os::linux::{LinuxOs, Offsets, SystemMap, TaskAddresses},
};

use zerocopy::IntoBytes as _;

use self::common::{MockDriver, link_records, map_kernel_window, map_user_page};

const PAGE_OFFSET: u64 = 0xc000_0000;

const KERNEL_PD: Pa = Pa(0x1000);
const PV_SWAPPER: Pa = Pa(0x3000);
const JIFFIES: Pa = Pa(0x5000);
const JIFFIES_64: Pa = Pa(0x5018);
const JIFFIES_64_VALUE: u64 = 0x0000_0001_0001_2345;

const INIT_TASK: Pa = Pa(0x10000);
const INIT: Pa = Pa(0x11000);
const KTHREADD: Pa = Pa(0x12000);
const BASH: Pa = Pa(0x13000);

const INIT_MM: Pa = Pa(0x20000);
const BASH_MM: Pa = Pa(0x21000);

const BASH_PD: Pa = Pa(0x31000);
const BASH_PT: Pa = Pa(0x32000);
const BASH_TEXT: Pa = Pa(0x40000);
const BASH_TEXT_VA: Va = Va(0x0804_8000);

const BASH_ADDRESSES: TaskAddresses = TaskAddresses {
    start_code: 0x0804_8000,
    end_code: 0x080c_4000,
    start_data: 0x080c_5000,
    end_data: 0x080c_9000,
    start_brk: 0x080c_a000,
    brk: 0x0810_0000,
    start_stack: 0xbfb0_0000,
    arg_start: 0xbfb0_1000,
    arg_end: 0xbfb0_1010,
    env_start: 0xbfb0_1010,
    env_end: 0xbfb0_1400,
};

///////////////////////////////////////////////////////////////////////////////
// Guest
///////////////////////////////////////////////////////////////////////////////

fn kva(pa: Pa) -> u32 {
    (pa.0 + PAGE_OFFSET) as u32
}

fn write_task(driver: &MockDriver, task: Pa, pid: u32, name: &str, mm: Option<Pa>) {
    let offsets = Offsets::default();

    driver.write_u32_pa(task + offsets.pid, pid);
    driver.write_u32_pa(task + offsets.mm, mm.map(kva).unwrap_or(0));
    driver.write_pa(task + offsets.name, name.as_bytes());
}

/// Builds a guest with four tasks: swapper (0), init (1), kthreadd (2)
/// and bash (42).
fn guest(driver: MockDriver) -> MockDriver {
    let offsets = Offsets::default();

    map_kernel_window(&driver, KERNEL_PD, PAGE_OFFSET);
    driver.write_u32_pa(PV_SWAPPER, kva(KERNEL_PD));
    driver.write_u32_pa(JIFFIES, 0x0001_2345);
    driver.write_pa(JIFFIES_64, &JIFFIES_64_VALUE.to_le_bytes());

    write_task(&driver, INIT_TASK, 0, "swapper", None);
    write_task(&driver, INIT, 1, "init", Some(INIT_MM));
    write_task(&driver, KTHREADD, 2, "kthreadd", None);
    write_task(&driver, BASH, 42, "bash", Some(BASH_MM));
    link_records(
        &driver,
        &[INIT_TASK, INIT, KTHREADD, BASH],
        offsets.tasks,
        PAGE_OFFSET,
    );

    driver.write_u32_pa(INIT_MM + offsets.pgd, kva(Pa(0x30000)));
    driver.write_u32_pa(BASH_MM + offsets.pgd, kva(BASH_PD));
    driver.write_pa(BASH_MM + offsets.addr, BASH_ADDRESSES.as_bytes());

    map_user_page(&driver, BASH_PD, BASH_PT, BASH_TEXT_VA, BASH_TEXT);
    driver.write_pa(BASH_TEXT + 0x10, &0x464c_457f_u32.to_le_bytes());

    driver
}

fn symbols(swapper_pg_dir: u64) -> SystemMap {
    SystemMap::parse(&format!(
        "c0100000 T _text\n\
         {swapper_pg_dir:08x} D swapper_pg_dir\n\
         {:08x} D init_task\n\
         {:08x} D jiffies\n\
         {:08x} D jiffies_64\n",
        kva(INIT_TASK),
        kva(JIFFIES),
        kva(JIFFIES_64),
    ))
    .unwrap()
}

fn session(driver: MockDriver, swapper_pg_dir: u64) -> XaSession<MockDriver, LinuxOs> {
    let core = XaCore::new(driver, PAGE_OFFSET).unwrap();
    let os = LinuxOs::with_symbols(Offsets::default(), symbols(swapper_pg_dir), PAGE_OFFSET);
    XaSession::new(core, os).unwrap()
}

fn hvm_session() -> XaSession<MockDriver, LinuxOs> {
    session(guest(MockDriver::hvm()), kva(KERNEL_PD) as u64)
}

fn pv_session() -> XaSession<MockDriver, LinuxOs> {
    session(guest(MockDriver::pv()), kva(PV_SWAPPER) as u64)
}

///////////////////////////////////////////////////////////////////////////////
// Bootstrap
///////////////////////////////////////////////////////////////////////////////

#[test]
fn bootstrap_hvm() {
    let session = hvm_session();

    assert_eq!(session.kernel_root().unwrap(), Va(0xc000_1000));
    assert_eq!(session.process_list_head(), Va(kva(INIT) as u64 + 0x60));
    assert!(!session.frame_table().is_built());
}

#[test]
fn bootstrap_pv_follows_swapper_pg_dir() {
    let session = pv_session();

    assert_eq!(session.kernel_root().unwrap(), Va(0xc000_1000));
    assert_eq!(session.process_list_head(), Va(kva(INIT) as u64 + 0x60));
    assert!(session.frame_table().is_built());
}

#[test]
fn bootstrap_pv_rejects_empty_swapper_pg_dir() {
    let driver = guest(MockDriver::pv());
    driver.write_u32_pa(PV_SWAPPER, 0);

    let core = XaCore::new(driver, PAGE_OFFSET).unwrap();
    let os = LinuxOs::with_symbols(
        Offsets::default(),
        symbols(kva(PV_SWAPPER) as u64),
        PAGE_OFFSET,
    );

    assert!(matches!(XaSession::new(core, os), Err(XaError::Os(_))));
}

#[test]
fn bootstrap_requires_symbols() {
    let core = XaCore::new(guest(MockDriver::hvm()), PAGE_OFFSET).unwrap();
    let os = LinuxOs::with_symbols(Offsets::default(), SystemMap::default(), PAGE_OFFSET);

    assert!(matches!(
        XaSession::new(core, os),
        Err(XaError::SymbolNotFound(name)) if name == "swapper_pg_dir"
    ));
}

#[test]
fn pv_kernel_window_goes_through_the_frame_table() {
    let session = pv_session();

    let va = Va(kva(BASH) as u64 + 0x123);
    let expected = session.pa_to_ma(BASH + 0x123).unwrap();

    assert_eq!(expected, Ma(0x0101_3123));
    assert_eq!(session.translate_kernel(va).unwrap(), expected);
}

///////////////////////////////////////////////////////////////////////////////
// Process list
///////////////////////////////////////////////////////////////////////////////

#[test]
fn find_process_by_pid() {
    for session in [hvm_session(), pv_session()] {
        let bash = session.find_process(ProcessId(42)).unwrap().unwrap();

        assert_eq!(bash.id(), ProcessId(42));
        assert_eq!(bash.object().0, Va(kva(BASH) as u64));
        assert_eq!(session.process_name(&bash).unwrap(), "bash");
    }
}

#[test]
fn closing_record_is_never_reported() {
    let session = hvm_session();

    // init_task closes the cycle, so swapper is not found.
    assert!(session.find_process(ProcessId(0)).unwrap().is_none());
    assert!(session.find_process(ProcessId(7)).unwrap().is_none());

    let pids = session
        .processes()
        .map(|process| process.map(|process| process.id().0))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(pids, [1, 2, 42]);
}

#[test]
fn process_names() {
    let session = hvm_session();

    let names = session
        .processes()
        .map(|process| session.process_name(&process.unwrap()).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, ["init", "kthreadd", "bash"]);
}

#[test]
fn empty_process_list_is_detected_after_one_read() {
    let driver = MockDriver::hvm();
    map_kernel_window(&driver, KERNEL_PD, PAGE_OFFSET);
    write_task(&driver, INIT_TASK, 0, "swapper", None);
    link_records(&driver, &[INIT_TASK], Offsets::default().tasks, PAGE_OFFSET);

    let session = session(driver, kva(KERNEL_PD) as u64);
    assert_eq!(session.process_list_head(), Va(kva(INIT_TASK) as u64 + 0x60));

    let before = session.driver().maps();
    assert!(session.find_process(ProcessId(1)).unwrap().is_none());
    assert_eq!(session.driver().maps() - before, 1);

    assert_eq!(session.processes().count(), 0);
}

#[test]
fn broken_link_surfaces_an_error() {
    let driver = guest(MockDriver::hvm());
    // Point kthreadd's link beyond the mapped kernel window.
    driver.write_u32_pa(KTHREADD + Offsets::default().tasks, 0xc080_0000);

    let session = session(driver, kva(KERNEL_PD) as u64);
    assert!(session.find_process(ProcessId(42)).is_err());

    let mut processes = session.processes();
    assert_eq!(processes.next().unwrap().unwrap().id(), ProcessId(1));
    assert_eq!(processes.next().unwrap().unwrap().id(), ProcessId(2));
    assert!(processes.next().unwrap().is_err());
    assert!(processes.next().is_none());
}

///////////////////////////////////////////////////////////////////////////////
// Page directories and user memory
///////////////////////////////////////////////////////////////////////////////

#[test]
fn pid_to_page_directory() {
    let session = hvm_session();

    assert_eq!(
        session.pid_to_page_directory(ProcessId(42)).unwrap(),
        Va(kva(BASH_PD) as u64)
    );
    assert_eq!(
        session.pid_to_page_directory(ProcessId(1)).unwrap(),
        Va(0xc003_0000)
    );
    assert!(matches!(
        session.pid_to_page_directory(ProcessId(7)),
        Err(XaError::ProcessNotFound(7))
    ));
}

#[test]
fn kernel_threads_have_no_page_directory() {
    let session = hvm_session();

    assert!(matches!(
        session.pid_to_page_directory(ProcessId(2)),
        Err(XaError::Os(_))
    ));
}

#[test]
fn user_memory() {
    for session in [hvm_session(), pv_session()] {
        let va = BASH_TEXT_VA + 0x10;

        let expected = session.driver().pa_to_ma(BASH_TEXT + 0x10);
        assert_eq!(session.translate_user(va, ProcessId(42)).unwrap(), expected);
        assert_eq!(session.read_u32_uva(va, ProcessId(42)).unwrap(), 0x464c_457f);

        // The translation is cached for the process.
        let before = session.driver().maps();
        assert_eq!(session.translate_user(va, ProcessId(42)).unwrap(), expected);
        assert_eq!(session.driver().maps(), before);

        // Other processes do not share it.
        assert!(session.translate_user(va, ProcessId(1)).is_err());
    }
}

#[test]
fn task_addresses() {
    let session = hvm_session();

    assert_eq!(
        LinuxOs::task_addresses(&session, ProcessId(42)).unwrap(),
        BASH_ADDRESSES
    );
    assert!(matches!(
        LinuxOs::task_addresses(&session, ProcessId(2)),
        Err(XaError::Os(_))
    ));
    assert!(matches!(
        LinuxOs::task_addresses(&session, ProcessId(9)),
        Err(XaError::ProcessNotFound(9))
    ));
}

#[test]
fn task_addresses_use_the_session_offsets() {
    let offsets = Offsets {
        addr: 0x100,
        ..Offsets::default()
    };

    let driver = guest(MockDriver::hvm());
    driver.write_pa(BASH_MM + offsets.addr, BASH_ADDRESSES.as_bytes());
    driver.write_pa(BASH_MM + Offsets::default().addr, &[0u8; 44]);

    let core = XaCore::new(driver, PAGE_OFFSET).unwrap();
    let os = LinuxOs::with_symbols(offsets, symbols(kva(KERNEL_PD) as u64), PAGE_OFFSET);
    let session = XaSession::new(core, os).unwrap();

    assert_eq!(
        LinuxOs::task_addresses(&session, ProcessId(42)).unwrap(),
        BASH_ADDRESSES
    );
}

///////////////////////////////////////////////////////////////////////////////
// Symbols
///////////////////////////////////////////////////////////////////////////////

#[test]
fn symbols_are_cached() {
    let session = hvm_session();

    let before = session.driver().maps();
    let ma = session.translate_symbol("swapper_pg_dir").unwrap();
    assert_eq!(ma, Ma(0x1000));
    assert!(session.driver().maps() > before);

    let before = session.driver().maps();
    assert_eq!(session.translate_symbol("swapper_pg_dir").unwrap(), ma);
    assert_eq!(session.driver().maps(), before);

    assert_eq!(session.symbol_address("jiffies").unwrap(), Va(0xc000_5000));
    assert_eq!(session.read_u32_symbol("jiffies").unwrap(), 0x0001_2345);
    assert!(matches!(
        session.translate_symbol("sys_call_table"),
        Err(XaError::SymbolNotFound(_))
    ));
}

#[test]
fn read_u64_symbol() {
    for session in [hvm_session(), pv_session()] {
        assert_eq!(
            session.read_u64_symbol("jiffies_64").unwrap(),
            JIFFIES_64_VALUE
        );
        assert!(matches!(
            session.read_u64_symbol("jiffies_128"),
            Err(XaError::SymbolNotFound(_))
        ));
    }
}

///////////////////////////////////////////////////////////////////////////////
// Mapped pages
///////////////////////////////////////////////////////////////////////////////

#[test]
fn access_kernel_symbol() {
    for session in [hvm_session(), pv_session()] {
        let (page, offset) = session.access_kernel_symbol("jiffies_64").unwrap();

        assert_eq!(page.len(), 4096);
        assert_eq!(offset, 0x18);
        assert_eq!(&page[offset..offset + 8], &JIFFIES_64_VALUE.to_le_bytes());
        assert_eq!(&page[..4], &0x0001_2345_u32.to_le_bytes());
    }
}

#[test]
fn access_physical_and_kernel_virtual_addresses() {
    for session in [hvm_session(), pv_session()] {
        let (page, offset) = session.access_physical_address(JIFFIES_64).unwrap();
        assert_eq!(offset, 0x18);
        assert_eq!(&page[offset..offset + 8], &JIFFIES_64_VALUE.to_le_bytes());

        let va = Va(kva(JIFFIES_64) as u64);
        let (page, offset) = session.access_kernel_virtual_address(va).unwrap();
        assert_eq!(offset, 0x18);
        assert_eq!(&page[offset..offset + 8], &JIFFIES_64_VALUE.to_le_bytes());
    }
}

#[test]
fn access_user_virtual_address() {
    for session in [hvm_session(), pv_session()] {
        let va = BASH_TEXT_VA + 0x10;

        let (page, offset) = session
            .access_user_virtual_address(va, ProcessId(42))
            .unwrap();
        assert_eq!(page.len(), 4096);
        assert_eq!(offset, 0x10);
        assert_eq!(&page[offset..offset + 4], &0x464c_457f_u32.to_le_bytes());

        // Process id 0 goes through the kernel page directory.
        let (page, offset) = session
            .access_user_virtual_address(Va(kva(JIFFIES) as u64), ProcessId::KERNEL)
            .unwrap();
        assert_eq!(offset, 0);
        assert_eq!(&page[..4], &0x0001_2345_u32.to_le_bytes());

        assert!(matches!(
            session.access_user_virtual_address(va, ProcessId(9)),
            Err(XaError::ProcessNotFound(9))
        ));
    }
}
