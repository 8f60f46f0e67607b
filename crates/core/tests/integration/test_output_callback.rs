//! Output delivery from engine flows to registered callbacks

use media_channels::attrs::{AencChnAttr, AiChnAttr, VencChnAttr, ViChnAttr};
use media_channels::engine::loopback::{LoopbackBuffer, LoopbackEngine, LoopbackFlow};
use media_channels::{
    ChannelEndpoint, ChannelStatus, EngineBuffer, Error, MediaBufferHandle, MediaSystem,
    ModuleId, SystemConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

static FRAME: &[u8] = b"0123456789abcdef";

fn system() -> (MediaSystem, LoopbackEngine) {
    let engine = LoopbackEngine::new();
    let system = MediaSystem::new(Arc::new(engine.clone()), SystemConfig::default()).unwrap();
    (system, engine)
}

fn flow_of(
    system: &MediaSystem,
    engine: &LoopbackEngine,
    endpoint: ChannelEndpoint,
) -> Arc<LoopbackFlow> {
    let id = system.flow_id(endpoint).unwrap().unwrap();
    engine.flow(id).unwrap()
}

fn counting_callback(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(MediaBufferHandle) + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_handle| {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_callback_on_bound_encoder() {
    let (system, engine) = system();
    system.vi().create_chn(0, ViChnAttr::default()).unwrap();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    let (vi, venc) = (system.vi().endpoint(0), system.venc().endpoint(0));
    system.bind(vi, venc).unwrap();

    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    system
        .register_output_callback(venc, move |mut handle: MediaBufferHandle| {
            sink.lock().push(handle.size().unwrap());
            handle.release().unwrap();
        })
        .unwrap();
    assert_eq!(system.status(venc).unwrap(), ChannelStatus::Bind);

    // The capture flow produces; the bound encoder flow forwards to the callback.
    flow_of(&system, &engine, vi).push(Arc::new(LoopbackBuffer::from_static(FRAME)));

    assert_eq!(*sizes.lock(), vec![FRAME.len()]);
}

#[test]
fn test_handle_reports_engine_buffer_fields() {
    let (system, engine) = system();
    system.aenc().create_chn(0, AencChnAttr::default()).unwrap();
    let aenc = system.aenc().endpoint(0);

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    system
        .register_output_callback(aenc, move |mut handle: MediaBufferHandle| {
            let fields = (
                handle.as_ptr().unwrap() as usize,
                handle.fd().unwrap(),
                handle.size().unwrap(),
                handle.module_id().unwrap(),
            );
            handle.release().unwrap();
            let released = matches!(handle.size(), Err(Error::BufferReleased))
                && matches!(handle.data(), Err(Error::BufferReleased));
            *sink.lock() = Some((fields, released));
        })
        .unwrap();

    let buffer = LoopbackBuffer::from_static(FRAME)
        .with_fd(42)
        .with_valid_size(10);
    let ptr = buffer.data().unwrap().as_ptr() as usize;
    flow_of(&system, &engine, aenc).push(Arc::new(buffer));

    let ((got_ptr, fd, size, module), released) = seen.lock().take().unwrap();
    assert_eq!(got_ptr, ptr);
    assert_eq!(fd, Some(42));
    assert_eq!(size, 10);
    assert_eq!(module, ModuleId::Aenc);
    assert!(released);
}

#[test]
fn test_fd_only_buffer() {
    let (system, engine) = system();
    system.venc().create_chn(3, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    system
        .register_output_callback(venc, move |handle: MediaBufferHandle| {
            sink.lock().push((
                handle.as_ptr().unwrap().is_null(),
                handle.fd().unwrap(),
                matches!(handle.data(), Err(Error::NullPointer(_))),
            ));
        })
        .unwrap();

    flow_of(&system, &engine, venc).push(Arc::new(LoopbackBuffer::fd_only(7, 4096)));
    assert_eq!(*seen.lock(), vec![(true, Some(7), true)]);
}

#[test]
fn test_retained_handles_keep_buffer_alive() {
    let (system, engine) = system();
    system.ai().create_chn(0, AiChnAttr::default()).unwrap();
    let ai = system.ai().endpoint(0);

    let retained = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&retained);
    system
        .register_output_callback(ai, move |handle: MediaBufferHandle| {
            let extra = handle.acquire().unwrap();
            sink.lock().push(handle);
            sink.lock().push(extra);
        })
        .unwrap();

    let buffer: Arc<dyn EngineBuffer> = Arc::new(LoopbackBuffer::from_static(FRAME));
    flow_of(&system, &engine, ai).push(Arc::clone(&buffer));
    assert_eq!(Arc::strong_count(&buffer), 3);

    system.ai().destroy_chn(0).unwrap();
    assert_eq!(retained.lock()[0].data().unwrap(), FRAME);

    retained.lock().clear();
    assert_eq!(Arc::strong_count(&buffer), 1);
}

#[test]
fn test_end_of_stream_is_ignored() {
    let (system, engine) = system();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(0);

    let count = Arc::new(AtomicUsize::new(0));
    system
        .register_output_callback(venc, counting_callback(&count))
        .unwrap();

    let flow = flow_of(&system, &engine, venc);
    flow.push_end_of_stream();
    flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));
    flow.push_end_of_stream();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_register_requires_open() {
    let (system, _engine) = system();
    let venc = system.venc().endpoint(0);
    let count = Arc::new(AtomicUsize::new(0));

    let err = system
        .register_output_callback(venc, counting_callback(&count))
        .unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));

    system.venc().set_attr(0, VencChnAttr::default()).unwrap();
    assert!(system
        .register_output_callback(venc, counting_callback(&count))
        .is_err());

    let err = system
        .register_output_callback(ChannelEndpoint::new(ModuleId::Sys, 0), counting_callback(&count))
        .unwrap_err();
    assert!(matches!(err, Error::NotSupported(ModuleId::Sys)));
}

#[test]
fn test_reregister_replaces_callback() {
    let (system, engine) = system();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(0);

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    system
        .register_output_callback(venc, counting_callback(&first))
        .unwrap();
    system
        .register_output_callback(venc, counting_callback(&second))
        .unwrap();

    flow_of(&system, &engine, venc).push(Arc::new(LoopbackBuffer::from_static(FRAME)));
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_delivery_after_disable() {
    let (system, engine) = system();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(0);

    let count = Arc::new(AtomicUsize::new(0));
    system
        .register_output_callback(venc, counting_callback(&count))
        .unwrap();

    // An engine thread still holding the flow keeps producing after disable.
    let flow = flow_of(&system, &engine, venc);
    system.venc().disable_chn(0).unwrap();
    flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(!flow.has_output_callback());
}

#[test]
fn test_disable_waits_for_in_flight_callback() {
    let (system, engine) = system();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(0);

    let (entered_tx, entered_rx) = mpsc::channel();
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    let entered_tx = Mutex::new(entered_tx);
    system
        .register_output_callback(venc, move |_handle: MediaBufferHandle| {
            entered_tx.lock().send(()).ok();
            thread::sleep(Duration::from_millis(100));
            done.store(true, Ordering::SeqCst);
        })
        .unwrap();

    let flow = flow_of(&system, &engine, venc);
    let producer = thread::spawn(move || {
        flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));
    });

    entered_rx.recv().unwrap();
    system.venc().disable_chn(0).unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(system.status(venc).unwrap(), ChannelStatus::Closed);

    producer.join().unwrap();
}

#[test]
fn test_callback_may_use_sibling_channel_during_disable() {
    let (system, engine) = system();
    let system = Arc::new(system);
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    system.venc().create_chn(1, VencChnAttr::default()).unwrap();
    let venc = system.venc().endpoint(0);
    let sibling = system.venc().endpoint(1);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (delivered_tx, delivered_rx) = mpsc::channel();
    let entered_tx = Mutex::new(entered_tx);
    let delivered_tx = Mutex::new(delivered_tx);
    let inner = Arc::clone(&system);
    system
        .register_output_callback(venc, move |_handle: MediaBufferHandle| {
            entered_tx.lock().send(()).ok();
            thread::sleep(Duration::from_millis(100));
            // Needs the VENC table lock while disable_chn(0) is waiting on us.
            let sibling_flow = inner.flow_id(sibling).unwrap();
            let sibling_attr = inner.venc().get_attr(1).is_ok();
            delivered_tx
                .lock()
                .send((sibling_flow.is_some(), sibling_attr))
                .ok();
        })
        .unwrap();

    let flow = flow_of(&system, &engine, venc);
    let producer = thread::spawn(move || {
        flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));
    });
    entered_rx.recv().unwrap();

    let (disabled_tx, disabled_rx) = mpsc::channel();
    let disabler = {
        let system = Arc::clone(&system);
        thread::spawn(move || {
            let result = system.venc().disable_chn(0);
            disabled_tx.send(result.is_ok()).ok();
        })
    };

    let timeout = Duration::from_secs(3);
    assert_eq!(delivered_rx.recv_timeout(timeout).unwrap(), (true, true));
    assert!(disabled_rx.recv_timeout(timeout).unwrap());
    producer.join().unwrap();
    disabler.join().unwrap();

    assert_eq!(system.status(venc).unwrap(), ChannelStatus::Closed);
    assert_eq!(system.status(sibling).unwrap(), ChannelStatus::Open);
}

#[test]
fn test_shutdown_waits_for_callback_using_same_module() {
    let (system, engine) = system();
    let system = Arc::new(system);
    system.ai().create_chn(0, AiChnAttr::default()).unwrap();
    system.aenc().create_chn(0, AencChnAttr::default()).unwrap();
    let aenc = system.aenc().endpoint(0);

    let (entered_tx, entered_rx) = mpsc::channel();
    let entered_tx = Mutex::new(entered_tx);
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    let inner = Arc::clone(&system);
    system
        .register_output_callback(aenc, move |_handle: MediaBufferHandle| {
            entered_tx.lock().send(()).ok();
            thread::sleep(Duration::from_millis(100));
            let _ = inner.peer(inner.aenc().endpoint(1));
            done.store(true, Ordering::SeqCst);
        })
        .unwrap();

    let flow = flow_of(&system, &engine, aenc);
    let producer = thread::spawn(move || {
        flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));
    });
    entered_rx.recv().unwrap();

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let stopper = {
        let system = Arc::clone(&system);
        thread::spawn(move || {
            system.shutdown();
            shutdown_tx.send(()).ok();
        })
    };

    shutdown_rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert!(finished.load(Ordering::SeqCst));
    producer.join().unwrap();
    stopper.join().unwrap();
    assert_eq!(system.status(aenc).unwrap(), ChannelStatus::Closed);
}

#[test]
fn test_concurrent_producers() {
    let (system, engine) = system();
    let endpoints: Vec<_> = (0..4)
        .map(|index| {
            system.venc().create_chn(index, VencChnAttr::default()).unwrap();
            system.venc().endpoint(index)
        })
        .collect();

    let count = Arc::new(AtomicUsize::new(0));
    for endpoint in &endpoints {
        system
            .register_output_callback(*endpoint, counting_callback(&count))
            .unwrap();
    }

    let producers: Vec<_> = endpoints
        .iter()
        .map(|endpoint| {
            let flow = flow_of(&system, &engine, *endpoint);
            thread::spawn(move || {
                for _ in 0..250 {
                    flow.push(Arc::new(LoopbackBuffer::from_static(FRAME)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(count.load(Ordering::SeqCst), 1000);
}
