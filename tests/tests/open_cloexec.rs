use common::{
    cleanup_tmp_file, close_fd, common_test_setup, is_cloexec, open_tmp_file, path_str,
    start_broker,
};
use fsbroker::Policy;

#[test]
fn open_cloexec() {
    common_test_setup();
    let (_tmp, tmp_path) = open_tmp_file();
    let tmp = path_str(&tmp_path);
    let policy = Policy::from_whitelists(libc::EPERM, &[tmp], &[tmp]).unwrap();
    let broker = start_broker(policy, true);
    for flags in [libc::O_RDONLY, libc::O_WRONLY, libc::O_RDWR] {
        let fd = broker.open(tmp, flags | libc::O_CLOEXEC);
        assert!(fd >= 0, "open({:#o}) returned {}", flags | libc::O_CLOEXEC, fd);
        assert!(is_cloexec(fd));
        close_fd(fd);

        let fd = broker.open(tmp, flags);
        assert!(fd >= 0, "open({:#o}) returned {}", flags, fd);
        assert!(!is_cloexec(fd));
        close_fd(fd);
    }
    drop(broker);
    cleanup_tmp_file(&tmp_path);
}
