use common::{cleanup_tmp_file, common_test_setup, open_tmp_file};
use fsbroker::{BrokerConfig, BrokerProcess, Policy};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::Path;

#[test]
fn setup_hook_inherited_fds() {
    common_test_setup();
    let (hook_file, hook_path) = open_tmp_file();
    let (kept_file, kept_path) = open_tmp_file();

    // Descriptors opened before init() are still usable from the hook
    let hook: &dyn Fn() -> bool = &|| (&hook_file).write_all(b"from hook").is_ok();
    let config = BrokerConfig::new(Policy::nothing_allowed())
        .with_inherited_fd(kept_file.as_raw_fd())
        .with_quiet_failures_for_tests(true);
    let mut broker = BrokerProcess::new(config);
    assert_eq!(broker.init(Some(hook)), Ok(()));
    assert_eq!(std::fs::read_to_string(&hook_path).unwrap(), "from hook");

    // Afterwards, only the descriptors asked for survive in the broker
    let pid = broker.pid().expect("initialized broker has no pid");
    let in_broker = |fd: i32| Path::new(&format!("/proc/{}/fd/{}", pid, fd)).exists();
    assert!(in_broker(kept_file.as_raw_fd()));
    assert!(!in_broker(hook_file.as_raw_fd()));

    drop(broker);
    drop(hook_file);
    drop(kept_file);
    cleanup_tmp_file(&hook_path);
    cleanup_tmp_file(&kept_path);
}
