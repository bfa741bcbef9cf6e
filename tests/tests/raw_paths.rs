use common::{
    cleanup_tmp_file, close_fd, common_test_setup, open_tmp_file, path_str, start_broker,
};
use fsbroker::Policy;
use std::ffi::CString;

#[test]
fn raw_paths() {
    common_test_setup();
    let (_tmp, tmp_path) = open_tmp_file();
    let tmp = path_str(&tmp_path);
    let c_tmp = CString::new(tmp).unwrap();
    for fast_check in [true, false] {
        let policy = Policy::from_whitelists(libc::EACCES, &[tmp], &[]).unwrap();
        let broker = start_broker(policy, fast_check);
        unsafe {
            assert_eq!(broker.open_raw(core::ptr::null(), libc::O_RDONLY), -libc::EFAULT);
            assert_eq!(broker.access_raw(core::ptr::null(), libc::F_OK), -libc::EFAULT);

            // Can't be whitelisted
            let invalid = b"/tmp/\xff\xfe\0";
            let invalid = invalid.as_ptr() as *const libc::c_char;
            assert_eq!(broker.open_raw(invalid, libc::O_RDONLY), -libc::EACCES);
            assert_eq!(broker.access_raw(invalid, libc::F_OK), -libc::EACCES);

            assert_eq!(broker.access_raw(c_tmp.as_ptr(), libc::R_OK), 0);
            let fd = broker.open_raw(c_tmp.as_ptr(), libc::O_RDONLY);
            assert!(fd >= 0, "open_raw() returned {}", fd);
            close_fd(fd);
        }
    }
    cleanup_tmp_file(&tmp_path);
}
