use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use fbtap_core::{
    BufferObject, CaptureConfig, DeviceId, ExportError, FramebufferDescriptor, FramebufferId,
    PixelFormat,
};
use fbtap_extract::memory::MemoryObject;
use fbtap_session::CaptureSession;

fn descriptor(object: &dyn BufferObject, side: u32) -> FramebufferDescriptor<'_> {
    FramebufferDescriptor {
        id: FramebufferId(side as u64),
        width: side,
        height: side,
        format: PixelFormat::ARGB8888,
        pitch: side * 4,
        modifier: None,
        object: Some(object),
    }
}

/// Every read must come whole from a single capture: the fill byte tells
/// which one, and the length must match that capture's size.
#[test]
fn reads_never_observe_a_torn_capture() {
    let small = MemoryObject::paged(&[0xA1u8; 16 * 16 * 4]);
    let large = MemoryObject::paged(&[0xB2u8; 32 * 32 * 4]);
    let session = CaptureSession::new(CaptureConfig::default()).unwrap();
    session.capture(DeviceId(1), &descriptor(&small, 16)).unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..300 {
                let (object, side) = if i % 2 == 0 { (&large, 32) } else { (&small, 16) };
                session.notify_framebuffer_ready(DeviceId(1), &descriptor(object, side)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..2 {
            s.spawn(|| {
                let mut reads = 0;
                while !done.load(Ordering::SeqCst) || reads < 10 {
                    let bytes = session.read(0, 1 << 20).unwrap();
                    let expected = match bytes.first() {
                        Some(0xA1) => 16 * 16 * 4,
                        Some(0xB2) => 32 * 32 * 4,
                        other => panic!("unexpected first byte {:?}", other),
                    };
                    assert_eq!(bytes.len(), expected);
                    assert!(bytes.iter().all(|&b| b == bytes[0]));
                    reads += 1;
                }
            });
        }

        s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let report = session.status();
                assert!(report.count <= report.capacity);
                assert_eq!(report.count, report.captures.len());
            }
        });
    });

    assert_eq!(session.len(), 5);
    assert_eq!(session.latest_size(), Ok(16 * 16 * 4));
}

#[test]
fn offset_reads_see_a_consistent_size() {
    let object = MemoryObject::paged(&[0x5Au8; 64 * 64 * 4]);
    let session = CaptureSession::new(CaptureConfig::default()).unwrap();
    assert_eq!(session.read(0, 1), Err(ExportError::NoData));

    session.capture(DeviceId(2), &descriptor(&object, 64)).unwrap();
    let size = session.latest_size().unwrap();
    let mut offset = 0u64;
    let mut total = 0;
    loop {
        let chunk = session.read(offset, 1000).unwrap();
        if chunk.is_empty() {
            break;
        }
        total += chunk.len();
        offset += chunk.len() as u64;
    }
    assert_eq!(total, size);
}
