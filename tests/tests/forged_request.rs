use common::{cleanup_tmp_file, common_test_setup, open_tmp_file, path_str};
use fsbroker::{BrokerServer, IpcChannel, Policy, ServeError};
use fsbroker_ipc::IPC_MESSAGE_MAX_SIZE;
use fsbroker_ipc_messages::{BrokerReply, BrokerRequest};

// Sends `request` as a client would, and returns the end of the reply channel
fn send_request(control: &IpcChannel, request: &BrokerRequest) -> IpcChannel {
    let (reply_reader, reply_writer) = IpcChannel::new().unwrap();
    let mut buf = [0u8; IPC_MESSAGE_MAX_SIZE];
    control
        .send(request, Some(reply_writer.as_handle()), &mut buf)
        .unwrap();
    reply_reader
}

fn recv_reply(reply_reader: &IpcChannel) -> (BrokerReply, usize) {
    let mut buf = [0u8; 64];
    let (reply, handles) = reply_reader
        .recv::<BrokerReply>(&mut buf, true)
        .unwrap()
        .expect("broker closed the reply channel without answering");
    (reply, handles.len())
}

#[test]
fn forged_request() {
    common_test_setup();
    let (_tmp, tmp_path) = open_tmp_file();
    let tmp = path_str(&tmp_path);
    let policy = Policy::from_whitelists(libc::EPERM, &[tmp], &[]).unwrap();
    let (control, broker_end) = IpcChannel::new().unwrap();
    let server = BrokerServer::new(broker_end, &policy, false);

    // Valid descriptor count, corrupt payload: dropped, reply channel closed unanswered
    let (reply_reader, reply_writer) = IpcChannel::new().unwrap();
    control
        .send_raw(&[0xFF; 16], Some(reply_writer.as_handle()))
        .unwrap();
    drop(reply_writer);
    assert_eq!(server.serve_one(), Ok(()));
    let mut buf = [0u8; 64];
    assert!(reply_reader.recv_raw(&mut buf, true).unwrap().is_none());

    // Valid request with trailing garbage
    let mut buf = [0u8; IPC_MESSAGE_MAX_SIZE];
    let request = BrokerRequest::Access {
        path: tmp,
        mode: libc::R_OK,
    };
    let mut forged = fsbroker_ipc::serialize(&request, &mut buf).unwrap().to_vec();
    forged.push(0);
    let (reply_reader, reply_writer) = IpcChannel::new().unwrap();
    control
        .send_raw(&forged, Some(reply_writer.as_handle()))
        .unwrap();
    drop(reply_writer);
    assert_eq!(server.serve_one(), Ok(()));
    assert!(reply_reader.recv_raw(&mut buf, true).unwrap().is_none());

    // Empty message, which recvmsg() reports like the end of the channel
    control.send_raw(&[], None).unwrap();
    assert_eq!(server.serve_one(), Ok(()));

    // Valid request without a reply channel
    control.send(&request, None, &mut buf).unwrap();
    assert_eq!(server.serve_one(), Ok(()));

    // The broker still serves legitimate requests afterwards
    let reply_reader = send_request(&control, &request);
    assert_eq!(server.serve_one(), Ok(()));
    assert_eq!(recv_reply(&reply_reader), (BrokerReply::SyscallResult(0), 0));

    let reply_reader = send_request(
        &control,
        &BrokerRequest::Open {
            path: tmp,
            flags: libc::O_RDONLY,
        },
    );
    assert_eq!(server.serve_one(), Ok(()));
    assert_eq!(recv_reply(&reply_reader), (BrokerReply::SyscallResult(0), 1));

    // The broker enforces the policy on its own
    let reply_reader = send_request(
        &control,
        &BrokerRequest::Open {
            path: tmp,
            flags: libc::O_RDWR,
        },
    );
    assert_eq!(server.serve_one(), Ok(()));
    assert_eq!(
        recv_reply(&reply_reader),
        (BrokerReply::SyscallResult(-libc::EPERM), 0)
    );

    // A client which vanished before reading its reply does not stop the broker
    drop(send_request(&control, &request));
    assert_eq!(server.serve_one(), Ok(()));

    drop(control);
    assert_eq!(server.serve_one(), Err(ServeError::ControlChannelClosed));
    cleanup_tmp_file(&tmp_path);
}
