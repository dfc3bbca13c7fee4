//! Screen coordinator tests over the null backend

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use x11rb::protocol::shm::CompletionEvent;
use x11rb::protocol::xproto::{DestroyNotifyEvent, ExposeEvent, DESTROY_NOTIFY_EVENT, EXPOSE_EVENT};
use x11rb::protocol::Event;
use x11screen::backend::null::{bgra_format, NullRequest};
use x11screen::backend::{DirectFormat, PictFormatInfo, VisualInfo};
use x11screen::screen::encode_atoms;
use x11screen::{
    Error, NullBackend, Point, Rect, ResourceCounts, Screen, ScreenConfig, Size,
    UploadRecipient, UploadedEvent, WindowOptions, Xid,
};

fn setup() -> (Arc<NullBackend>, Screen) {
    setup_with(NullBackend::new(), ScreenConfig::default())
}

fn setup_with(backend: NullBackend, config: ScreenConfig) -> (Arc<NullBackend>, Screen) {
    let backend = Arc::new(backend);
    let screen = Screen::with_backend(Arc::clone(&backend), config).unwrap();
    (backend, screen)
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

fn expose(window: Xid, x: u16) -> Event {
    Event::Expose(ExposeEvent {
        response_type: EXPOSE_EVENT,
        sequence: 0,
        window,
        x,
        y: 0,
        width: 10,
        height: 10,
        count: 0,
    })
}

fn destroy_notify(window: Xid) -> Event {
    Event::DestroyNotify(DestroyNotifyEvent {
        response_type: DESTROY_NOTIFY_EVENT,
        sequence: 0,
        event: window,
        window,
    })
}

fn completion(sequence: u64, drawable: Xid, segment: Xid) -> Event {
    Event::ShmCompletion(CompletionEvent {
        response_type: 0,
        sequence: sequence as u16,
        drawable,
        minor_event: 3,
        major_event: 0,
        shmseg: segment,
        offset: 0,
    })
}

fn last_put_image(backend: &NullBackend) -> Option<(u64, Xid, Xid)> {
    backend.requests().into_iter().rev().find_map(|r| match r {
        NullRequest::ShmPutImage {
            sequence,
            drawable,
            segment,
        } => Some((sequence, drawable, segment)),
        _ => None,
    })
}

fn x_of(event: Event) -> u16 {
    match event {
        Event::Expose(ev) => ev.x,
        other => panic!("expected Expose, got {:?}", other),
    }
}

fn rgb565() -> PictFormatInfo {
    PictFormatInfo {
        id: 0x30,
        depth: 16,
        direct: true,
        layout: DirectFormat {
            red_shift: 11,
            red_mask: 0x1f,
            green_shift: 5,
            green_mask: 0x3f,
            blue_shift: 0,
            blue_mask: 0x1f,
            alpha_shift: 0,
            alpha_mask: 0,
        },
    }
}

// Startup

#[test]
fn test_startup_creates_hidden_helper_window() {
    let (backend, screen) = setup();
    let helper = *screen.helper();
    let requests = backend.requests();

    assert!(requests.contains(&NullRequest::CreateColormap {
        colormap: helper.colormap,
        visual: 0x5d,
    }));
    assert!(requests.contains(&NullRequest::CreateWindow {
        id: helper.window,
        parent: NullBackend::ROOT,
        depth: 32,
        visual: 0x5d,
    }));
    assert!(requests.contains(&NullRequest::CreateGC {
        gc: helper.gc,
        drawable: helper.window,
    }));
    assert!(!requests.contains(&NullRequest::MapWindow(helper.window)));

    assert_eq!(screen.formats().depth24, NullBackend::FORMAT_24);
    assert_eq!(screen.formats().depth32, NullBackend::FORMAT_32);
    assert_eq!(screen.atoms().wm_protocols, 0x12c);
    assert_eq!(screen.resource_counts(), ResourceCounts::default());
}

#[test]
fn test_depth16_only_server_fails() {
    let backend = Arc::new(NullBackend::new().with_formats(vec![rgb565()]));
    let err = Screen::with_backend(backend, ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::NoPictFormat(_)));
}

#[test]
fn test_missing_depth32_format_fails() {
    let backend = Arc::new(
        NullBackend::new().with_formats(vec![rgb565(), bgra_format(0x31, 24)]),
    );
    let err = Screen::with_backend(backend, ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::NoPictFormat(32)));
}

#[test]
fn test_missing_shm_extension_fails() {
    let backend = Arc::new(NullBackend::new().without_extension("MIT-SHM"));
    let err = Screen::with_backend(backend, ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::MissingExtension("MIT-SHM")));
}

#[test]
fn test_missing_render_extension_fails() {
    let backend = Arc::new(NullBackend::new().without_extension("RENDER"));
    let err = Screen::with_backend(backend, ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::MissingExtension("RENDER")));
}

#[test]
fn test_old_shm_version_fails() {
    let backend = Arc::new(NullBackend::new().with_shm_version(1, 1));
    let err = Screen::with_backend(Arc::clone(&backend), ScreenConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::UnsupportedShmVersion(1, 1)));
    assert!(!backend
        .requests()
        .iter()
        .any(|r| matches!(r, NullRequest::CreateWindow { .. })));
}

#[test]
fn test_newer_shm_version_accepted() {
    let backend = Arc::new(NullBackend::new().with_shm_version(2, 0));
    assert!(Screen::with_backend(backend, ScreenConfig::default()).is_ok());
}

#[test]
fn test_no_depth32_visual_fails() {
    let backend = Arc::new(NullBackend::new().with_visuals(vec![VisualInfo {
        visual_id: 0x21,
        depth: 24,
        class: 4,
        red_mask: 0xff0000,
        green_mask: 0xff00,
        blue_mask: 0xff,
    }]));
    let err = Screen::with_backend(backend, ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::NoVisual(32)));
}

#[test]
fn test_atom_failure_is_fatal() {
    let backend = NullBackend::new();
    backend.fail_next("InternAtom");
    let err = Screen::with_backend(Arc::new(backend), ScreenConfig::default()).err().unwrap();
    assert!(matches!(err, Error::Connection { op: "InternAtom", .. }));
}

// Buffers

#[test]
fn test_buffer_10x10() {
    let (backend, screen) = setup();
    let buffer = screen.create_buffer(Size::new(10, 10)).unwrap();

    assert_eq!(buffer.pixels().len(), 400);
    assert_eq!(buffer.stride(), 40);
    assert!(!buffer.is_busy());
    assert!(backend.requests().contains(&NullRequest::ShmAttach {
        segment: buffer.segment(),
        read_only: false,
    }));
    assert_eq!(screen.resource_counts().buffers, 1);
}

#[test]
fn test_buffer_pixels_are_writable() {
    let (_backend, screen) = setup();
    let mut buffer = screen.create_buffer(Size::new(4, 2)).unwrap();
    buffer.pixels_mut().fill(0x7f);
    assert!(buffer.pixels().iter().all(|b| *b == 0x7f));
}

#[test]
fn test_empty_buffer() {
    let (_backend, screen) = setup();
    let buffer = screen.create_buffer(Size::new(0, 0)).unwrap();
    assert!(buffer.pixels().is_empty());
    assert_eq!(buffer.stride(), 0);
}

#[test]
fn test_oversized_buffer_allocates_nothing() {
    let (backend, screen) = setup();
    let ids = backend.ids_allocated();
    let requests = backend.requests().len();

    let sizes = [
        Size::new(40000, 1),
        Size::new(-1, 1),
        Size::new(1, 0x8000),
        Size::new(8193, 8192),
    ];
    for size in sizes {
        let err = screen.create_buffer(size).err().unwrap();
        assert!(err.is_invalid_size(), "{:?} gave {}", size, err);
    }

    assert_eq!(backend.ids_allocated(), ids);
    assert_eq!(backend.requests().len(), requests);
    assert_eq!(screen.resource_counts().buffers, 0);
}

#[test]
fn test_buffer_attach_failure_leaves_nothing_registered() {
    let (backend, screen) = setup();
    backend.fail_next("ShmAttachFd");
    assert!(screen.create_buffer(Size::new(10, 10)).is_err());
    assert_eq!(screen.resource_counts().buffers, 0);
}

#[test]
fn test_segment_id_failure() {
    let (backend, screen) = setup();
    backend.fail_next("NewSegId");
    let err = screen.create_buffer(Size::new(10, 10)).err().unwrap();
    assert!(matches!(err, Error::IdsExhausted { op: "NewSegId" }));
}

#[test]
fn test_buffer_release_detaches() {
    let (backend, screen) = setup();
    let buffer = screen.create_buffer(Size::new(8, 8)).unwrap();
    let segment = buffer.segment();

    buffer.release();
    assert!(backend.requests().contains(&NullRequest::ShmDetach(segment)));
    assert_eq!(screen.resource_counts().buffers, 0);
}

// Textures

#[test]
fn test_texture_uses_helper_window() {
    let (backend, screen) = setup();
    let texture = screen.create_texture(Size::new(16, 8)).unwrap();
    let requests = backend.requests();

    assert!(requests.contains(&NullRequest::CreatePixmap {
        depth: 32,
        pixmap: texture.pixmap(),
        drawable: screen.helper().window,
        width: 16,
        height: 8,
    }));
    assert!(requests.contains(&NullRequest::CreatePicture {
        picture: texture.picture(),
        drawable: texture.pixmap(),
        format: NullBackend::FORMAT_32,
    }));
}

#[test]
fn test_texture_size_validation() {
    let (backend, screen) = setup();
    let ids = backend.ids_allocated();
    assert!(screen.create_texture(Size::new(40000, 1)).err().unwrap().is_invalid_size());
    assert_eq!(backend.ids_allocated(), ids);
}

#[test]
fn test_texture_picture_failure_frees_pixmap() {
    let (backend, screen) = setup();
    backend.fail_next("CreatePicture");
    assert!(screen.create_texture(Size::new(4, 4)).is_err());

    let pixmap = backend
        .requests()
        .iter()
        .find_map(|r| match r {
            NullRequest::CreatePixmap { pixmap, .. } => Some(*pixmap),
            _ => None,
        })
        .unwrap();
    assert!(backend.requests().contains(&NullRequest::FreePixmap(pixmap)));
}

#[test]
fn test_texture_release_frees_resources() {
    let (backend, screen) = setup();
    let texture = screen.create_texture(Size::new(4, 4)).unwrap();
    let (pixmap, picture) = (texture.pixmap(), texture.picture());
    texture.release();

    let requests = backend.requests();
    assert!(requests.contains(&NullRequest::FreePicture(picture)));
    assert!(requests.contains(&NullRequest::FreePixmap(pixmap)));
}

// Windows

#[test]
fn test_window_setup_requests() {
    let (backend, screen) = setup();
    let options = WindowOptions::default().with_title("hello").with_size(320, 200);
    let window = screen.create_window(&options).unwrap();
    let id = window.id();
    let requests = backend.requests();

    assert!(requests.contains(&NullRequest::CreateWindow {
        id,
        parent: NullBackend::ROOT,
        depth: 24,
        visual: 0x21,
    }));
    assert!(requests.contains(&NullRequest::ChangeProperty {
        window: id,
        property: 0x12c,
        type_: 4,
        format: 32,
        data: encode_atoms(&[0x12d, 0x12e]),
    }));
    assert!(requests.contains(&NullRequest::ChangeProperty {
        window: id,
        property: 39,
        type_: 31,
        format: 8,
        data: b"hello".to_vec(),
    }));
    assert!(requests.contains(&NullRequest::CreatePicture {
        picture: window.picture(),
        drawable: id,
        format: NullBackend::FORMAT_24,
    }));
    assert_eq!(requests.last(), Some(&NullRequest::MapWindow(id)));
    assert_eq!(window.size(), (320, 200));
    assert_eq!(screen.resource_counts().windows, 1);
}

#[test]
fn test_window_destroy_waits_for_notify() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let (id, gc, picture) = (window.id(), window.gc(), window.picture());
    window.destroy();

    let requests = backend.requests();
    assert!(requests.contains(&NullRequest::FreePicture(picture)));
    assert!(requests.contains(&NullRequest::FreeGC(gc)));
    assert!(requests.contains(&NullRequest::DestroyWindow(id)));
    assert_eq!(screen.resource_counts().windows, 1);

    backend.push_event(destroy_notify(id));
    wait_for("the window to be unregistered", || {
        screen.resource_counts().windows == 0
    });
}

#[test]
fn test_unsupported_root_depth() {
    let (_backend, screen) =
        setup_with(NullBackend::new().with_root_depth(16), ScreenConfig::default());
    let err = screen.create_window(&WindowOptions::default()).err().unwrap();
    assert!(matches!(err, Error::UnsupportedDepth(16)));
    assert_eq!(screen.resource_counts().windows, 0);
}

#[test]
fn test_window_id_failure_creates_nothing() {
    let (backend, screen) = setup();
    let before = backend.requests().len();
    backend.fail_next("NewPictureId");

    let err = screen.create_window(&WindowOptions::default()).err().unwrap();
    assert!(matches!(err, Error::IdsExhausted { op: "NewPictureId" }));
    assert_eq!(backend.requests().len(), before);
}

#[test]
fn test_map_failure_leaves_no_registration() {
    let (backend, screen) = setup();
    backend.fail_next("MapWindow");
    assert!(screen.create_window(&WindowOptions::default()).is_err());
    assert_eq!(screen.resource_counts().windows, 0);

    let requests = backend.requests();
    let (id, gc, picture) = requests
        .iter()
        .rev()
        .find_map(|r| match r {
            NullRequest::CreatePicture {
                picture, drawable, ..
            } => Some((*drawable, *picture)),
            _ => None,
        })
        .and_then(|(id, picture)| {
            requests.iter().find_map(|r| match r {
                NullRequest::CreateGC { gc, drawable } if *drawable == id => {
                    Some((id, *gc, picture))
                }
                _ => None,
            })
        })
        .unwrap();

    // cleanup runs in reverse order of creation
    let tail: Vec<_> = requests[requests.len() - 3..].to_vec();
    assert_eq!(
        tail,
        vec![
            NullRequest::FreePicture(picture),
            NullRequest::FreeGC(gc),
            NullRequest::DestroyWindow(id),
        ]
    );
}

#[test]
fn test_destroy_notify_closes_channel_once() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let other = screen.create_window(&WindowOptions::default()).unwrap();

    backend.push_event(expose(window.id(), 1));
    backend.push_event(destroy_notify(window.id()));
    assert_eq!(x_of(window.next_event().unwrap()), 1);
    assert!(window.next_event().is_none());
    assert!(window.next_event().is_none());
    assert_eq!(screen.resource_counts().windows, 1);

    // a repeated DestroyNotify is unknown by now and must not disturb anything
    backend.push_event(destroy_notify(window.id()));
    backend.push_event(expose(other.id(), 2));
    assert_eq!(x_of(other.next_event().unwrap()), 2);
    assert_eq!(screen.resource_counts().windows, 1);
}

#[test]
fn test_unknown_destroy_is_dropped() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();

    backend.push_event(destroy_notify(0x0dea_d000));
    backend.push_event(expose(0x0dea_d000, 9));
    backend.push_event(expose(window.id(), 3));

    assert_eq!(x_of(window.next_event().unwrap()), 3);
    assert_eq!(screen.resource_counts().windows, 1);
}

#[test]
fn test_events_delivered_in_order() {
    let (backend, screen) = setup_with(NullBackend::new(), ScreenConfig::rendezvous());
    let window = screen.create_window(&WindowOptions::default()).unwrap();

    for x in 0..20 {
        backend.push_event(expose(window.id(), x));
    }
    for x in 0..20 {
        assert_eq!(x_of(window.next_event().unwrap()), x);
    }
}

#[test]
fn test_read_error_does_not_stop_dispatch() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();

    backend.push_read_error();
    backend.push_read_error();
    backend.push_event(expose(window.id(), 4));
    assert_eq!(x_of(window.next_event().unwrap()), 4);
}

#[test]
fn test_dropped_window_does_not_block_dispatch() {
    let (backend, screen) = setup_with(NullBackend::new(), ScreenConfig::rendezvous());
    let gone = screen.create_window(&WindowOptions::default()).unwrap();
    let gone_id = gone.id();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    drop(gone);

    backend.push_event(expose(gone_id, 1));
    backend.push_event(expose(window.id(), 2));
    assert_eq!(x_of(window.next_event().unwrap()), 2);
}

// Uploads

#[test]
fn test_upload_completion_reaches_recipient() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(10, 10)).unwrap();

    let (tx, rx) = mpsc::channel::<UploadedEvent>();
    let recipient: Arc<dyn UploadRecipient> = Arc::new(tx);
    window
        .upload(&buffer, Point::new(5, 5), buffer.bounds(), Some(recipient))
        .unwrap();
    assert!(buffer.is_busy());
    assert_eq!(screen.resource_counts().uploads, 1);

    let (sequence, drawable, segment) = last_put_image(&backend).unwrap();
    assert_eq!((drawable, segment), (window.id(), buffer.segment()));
    backend.push_event(completion(sequence, drawable, segment));

    let done = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        done,
        UploadedEvent {
            segment: buffer.segment(),
            drawable: window.id(),
        }
    );
    wait_for("buffer to go idle", || !buffer.is_busy());
    assert_eq!(screen.resource_counts().uploads, 0);
}

#[test]
fn test_texture_upload_uses_helper_gc() {
    let (backend, screen) = setup();
    let texture = screen.create_texture(Size::new(8, 8)).unwrap();
    let buffer = screen.create_buffer(Size::new(8, 8)).unwrap();

    texture
        .upload(&buffer, Point::default(), buffer.bounds(), None)
        .unwrap();
    let (sequence, drawable, segment) = last_put_image(&backend).unwrap();
    assert_eq!(drawable, texture.pixmap());

    backend.push_event(completion(sequence, drawable, segment));
    wait_for("buffer to go idle", || !buffer.is_busy());
}

#[test]
fn test_upload_outside_buffer_is_skipped() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(10, 10)).unwrap();

    window
        .upload(&buffer, Point::default(), Rect::new(20, 20, 5, 5), None)
        .unwrap();
    assert!(last_put_image(&backend).is_none());
    assert!(!buffer.is_busy());
}

#[test]
fn test_unmatched_completion_is_dropped() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();

    backend.push_event(completion(999, window.id(), 0x1234));
    backend.push_event(expose(window.id(), 6));
    assert_eq!(x_of(window.next_event().unwrap()), 6);
    assert_eq!(screen.resource_counts().uploads, 0);
}

#[test]
fn test_completion_processed_once() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(2, 2)).unwrap();

    let (tx, rx) = mpsc::channel::<UploadedEvent>();
    window
        .upload(&buffer, Point::default(), buffer.bounds(), Some(Arc::new(tx)))
        .unwrap();
    let (sequence, drawable, segment) = last_put_image(&backend).unwrap();
    backend.push_event(completion(sequence, drawable, segment));
    backend.push_event(completion(sequence, drawable, segment));

    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_put_image_failure_leaves_buffer_idle() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(2, 2)).unwrap();

    backend.fail_next("ShmPutImage");
    assert!(window
        .upload(&buffer, Point::default(), buffer.bounds(), None)
        .is_err());
    assert!(!buffer.is_busy());
    assert_eq!(screen.resource_counts().uploads, 0);
}

#[test]
fn test_release_does_not_wait_for_completion() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(4, 4)).unwrap();
    let segment = buffer.segment();

    window
        .upload(&buffer, Point::default(), buffer.bounds(), None)
        .unwrap();
    let (sequence, drawable, _) = last_put_image(&backend).unwrap();

    buffer.release();
    assert!(!backend.requests().contains(&NullRequest::ShmDetach(segment)));
    assert_eq!(screen.resource_counts().buffers, 1);

    backend.push_event(completion(sequence, drawable, segment));
    wait_for("the released segment to be detached", || {
        backend.requests().contains(&NullRequest::ShmDetach(segment))
    });
    wait_for("the buffer to be unregistered", || {
        screen.resource_counts().buffers == 0
    });
}

#[test]
fn test_release_without_completion_returns() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let buffer = screen.create_buffer(Size::new(4, 4)).unwrap();
    let segment = buffer.segment();

    window
        .upload(&buffer, Point::default(), buffer.bounds(), None)
        .unwrap();

    // the server never answers; releasing must not hang
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        buffer.release();
        done_tx.send(()).unwrap();
    });
    assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());

    thread::sleep(Duration::from_millis(50));
    assert!(!backend.requests().contains(&NullRequest::ShmDetach(segment)));
    let counts = screen.resource_counts();
    assert_eq!(counts.buffers, 1);
    assert_eq!(counts.uploads, 1);
}

#[test]
fn test_idle_buffer_release_detaches_immediately() {
    let (backend, screen) = setup();
    let buffer = screen.create_buffer(Size::new(4, 4)).unwrap();
    let segment = buffer.segment();

    buffer.release();
    assert!(backend.requests().contains(&NullRequest::ShmDetach(segment)));
    assert_eq!(screen.resource_counts().buffers, 0);
}

#[test]
fn test_try_pixels_mut_while_busy() {
    let (backend, screen) = setup();
    let window = screen.create_window(&WindowOptions::default()).unwrap();
    let mut buffer = screen.create_buffer(Size::new(2, 2)).unwrap();

    assert_eq!(buffer.try_pixels_mut().map(|p| p.len()), Some(16));
    window
        .upload(&buffer, Point::default(), buffer.bounds(), None)
        .unwrap();
    assert!(buffer.try_pixels_mut().is_none());

    let (sequence, drawable, segment) = last_put_image(&backend).unwrap();
    backend.push_event(completion(sequence, drawable, segment));
    wait_for("the upload to complete", || !buffer.is_busy());
    assert!(buffer.try_pixels_mut().is_some());
}

// Concurrency

#[test]
fn test_concurrent_creation_keeps_tables_consistent() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 10;

    let (backend, screen) = setup();

    // noise for the dispatch thread while the tables are being filled
    let noise = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for i in 0..200 {
                backend.push_event(expose(0x0f00_0000 + i, 0));
                backend.push_event(destroy_notify(0x0f00_0000 + i));
            }
        })
    };

    // destroys every other window as soon as it is created, while the
    // workers keep creating
    let (created_tx, created_rx) = mpsc::channel::<Xid>();
    let destroyer = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            let mut destroyed = Vec::new();
            for (n, id) in created_rx.into_iter().enumerate() {
                if n % 2 == 0 {
                    backend.push_event(destroy_notify(id));
                    destroyed.push(id);
                }
            }
            destroyed
        })
    };

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let screen = screen.clone();
            let created = created_tx.clone();
            thread::spawn(move || {
                let mut windows = Vec::new();
                let mut buffers = Vec::new();
                let mut textures = Vec::new();
                for i in 0..PER_THREAD {
                    let window = screen.create_window(&WindowOptions::default()).unwrap();
                    created.send(window.id()).unwrap();
                    windows.push(window);
                    textures.push(screen.create_texture(Size::new(4, 4)).unwrap());
                    let buffer = screen.create_buffer(Size::new(4, 4)).unwrap();
                    // keep every other buffer
                    if i % 2 == 0 {
                        buffers.push(buffer);
                    }
                }
                (windows, buffers, textures)
            })
        })
        .collect();
    drop(created_tx);

    let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let destroyed = destroyer.join().unwrap();
    noise.join().unwrap();

    let windows: Vec<_> = results.iter().flat_map(|(w, _, _)| w.iter()).collect();
    let buffers: usize = results.iter().map(|(_, b, _)| b.len()).sum();
    assert_eq!(windows.len(), THREADS * PER_THREAD);
    assert_eq!(buffers, THREADS * PER_THREAD / 2);
    assert_eq!(destroyed.len(), THREADS * PER_THREAD / 2);

    let mut ids: Vec<Xid> = windows.iter().map(|w| w.id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), THREADS * PER_THREAD);

    let expected = THREADS * PER_THREAD - destroyed.len();
    wait_for("destroyed windows to be unregistered", || {
        screen.resource_counts().windows == expected
    });
    assert_eq!(screen.resource_counts().buffers, buffers);

    for window in windows {
        if destroyed.contains(&window.id()) {
            assert!(window.next_event().is_none());
        } else {
            assert!(window.try_next_event().is_err());
        }
    }
}
