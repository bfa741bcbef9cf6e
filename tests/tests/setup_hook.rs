use common::{cleanup_tmp_file, common_test_setup, open_tmp_file, path_str};
use fsbroker::{BrokerConfig, BrokerError, BrokerProcess, Policy};

// Returns true if this process has no child left, not even a zombie
fn no_child_left() -> bool {
    let res = unsafe { libc::waitpid(-1, core::ptr::null_mut(), libc::WNOHANG) };
    res == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ECHILD)
}

fn new_broker() -> BrokerProcess {
    BrokerProcess::new(
        BrokerConfig::new(Policy::nothing_allowed()).with_quiet_failures_for_tests(true),
    )
}

#[test]
fn setup_hook() {
    common_test_setup();

    let mut broker = new_broker();
    let failing_hook: &dyn Fn() -> bool = &|| false;
    assert_eq!(broker.init(Some(failing_hook)), Err(BrokerError::SetupHookFailed));
    assert_eq!(broker.pid(), None);
    assert!(no_child_left());
    // Failed initializations can be retried
    assert_eq!(broker.init(None), Ok(()));
    drop(broker);
    assert!(no_child_left());

    let mut broker = new_broker();
    let exiting_hook: &dyn Fn() -> bool = &|| unsafe { libc::_exit(3) };
    assert_eq!(
        broker.init(Some(exiting_hook)),
        Err(BrokerError::ProcessExitedDuringInitialization)
    );
    let panicking_hook: &dyn Fn() -> bool = &|| panic!("setup failed");
    assert_eq!(
        broker.init(Some(panicking_hook)),
        Err(BrokerError::ProcessExitedDuringInitialization)
    );
    assert_eq!(broker.pid(), None);
    assert!(no_child_left());

    // The hook runs in the broker process, before it serves anything
    let (_marker, marker_path) = open_tmp_file();
    let marker = path_str(&marker_path).to_owned();
    let marking_hook: &dyn Fn() -> bool =
        &move || std::fs::write(&marker, format!("{}", std::process::id())).is_ok();
    let mut broker = new_broker();
    assert_eq!(broker.init(Some(marking_hook)), Ok(()));
    let pid = broker.pid().expect("initialized broker has no pid");
    assert_ne!(pid as u32, std::process::id());
    assert_eq!(
        std::fs::read_to_string(&marker_path).unwrap(),
        format!("{}", pid)
    );
    assert_eq!(broker.init(None), Err(BrokerError::AlreadyInitialized));
    assert_eq!(broker.pid(), Some(pid));
    drop(broker);
    assert!(no_child_left());
    cleanup_tmp_file(&marker_path);
}
