use common::{
    cleanup_tmp_file, close_fd, common_test_setup, open_tmp_file, path_str, start_broker,
};
use fsbroker::Policy;
#[test]
fn open_denied_by_policy() {
    common_test_setup();
    let (_readonly, readonly_path) = open_tmp_file();
    let (_both, both_path) = open_tmp_file();
    let (readonly, both) = (path_str(&readonly_path), path_str(&both_path));
    for fast_check in [true, false] {
        let policy = Policy::from_whitelists(libc::EPERM, &[readonly, both], &[both]).unwrap();
        let broker = start_broker(policy, fast_check);

        let fd = broker.open(readonly, libc::O_RDONLY);
        assert!(fd >= 0, "open(O_RDONLY) returned {}", fd);
        close_fd(fd);
        assert_eq!(broker.open(readonly, libc::O_WRONLY), -libc::EPERM);
        assert_eq!(broker.open(readonly, libc::O_RDWR), -libc::EPERM);

        // Files are never created, even where they could be written to
        for flags in [libc::O_RDONLY, libc::O_WRONLY, libc::O_RDWR] {
            assert_eq!(broker.open(both, flags | libc::O_CREAT), -libc::EPERM);
            assert_eq!(
                broker.open("/tmp/fsbroker_never_created", flags | libc::O_CREAT),
                -libc::EPERM
            );
        }
        assert!(!std::path::Path::new("/tmp/fsbroker_never_created").exists());

        // Descriptors opened by the broker are usable as if opened locally
        let fd = broker.open(both, libc::O_WRONLY | libc::O_TRUNC);
        assert!(fd >= 0, "open(O_WRONLY) returned {}", fd);
        let written = unsafe { libc::write(fd, b"OK".as_ptr() as *const libc::c_void, 2) };
        assert_eq!(written, 2);
        close_fd(fd);
        assert_eq!(std::fs::read_to_string(&both_path).unwrap(), "OK");
    }
    cleanup_tmp_file(&readonly_path);
    cleanup_tmp_file(&both_path);
}
