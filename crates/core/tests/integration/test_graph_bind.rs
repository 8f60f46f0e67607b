//! Bind/unbind between channels of the same and different module types

use media_channels::attrs::{AencChnAttr, AiChnAttr, AoChnAttr, VencChnAttr, ViChnAttr};
use media_channels::engine::loopback::LoopbackEngine;
use media_channels::{
    BindPeer, ChannelEndpoint, ChannelStatus, Error, MediaSystem, ModuleId, SystemConfig,
};
use std::sync::Arc;
use std::thread;

fn system() -> (MediaSystem, LoopbackEngine) {
    let engine = LoopbackEngine::new();
    let system = MediaSystem::new(Arc::new(engine.clone()), SystemConfig::default()).unwrap();
    (system, engine)
}

/// VI[0] and VENC[0] both OPEN
fn capture_and_encoder(system: &MediaSystem) -> (ChannelEndpoint, ChannelEndpoint) {
    system.vi().create_chn(0, ViChnAttr::default()).unwrap();
    system.venc().create_chn(0, VencChnAttr::default()).unwrap();
    (system.vi().endpoint(0), system.venc().endpoint(0))
}

fn downstream_ids(system: &MediaSystem, engine: &LoopbackEngine, src: ChannelEndpoint) -> usize {
    let id = system.flow_id(src).unwrap().unwrap();
    engine.flow(id).unwrap().downstream().len()
}

#[test]
fn test_bind_unbind_cycle_is_repeatable() {
    let (system, engine) = system();
    let (vi, venc) = capture_and_encoder(&system);

    for _ in 0..10 {
        system.bind(vi, venc).unwrap();
        assert_eq!(system.status(vi).unwrap(), ChannelStatus::Bind);
        assert_eq!(system.status(venc).unwrap(), ChannelStatus::Bind);
        assert_eq!(downstream_ids(&system, &engine, vi), 1);

        system.unbind(vi, venc).unwrap();
        assert_eq!(system.status(vi).unwrap(), ChannelStatus::Open);
        assert_eq!(system.status(venc).unwrap(), ChannelStatus::Open);
        assert_eq!(downstream_ids(&system, &engine, vi), 0);
    }
}

#[test]
fn test_bind_requires_both_open() {
    let (system, _engine) = system();
    system.ai().set_attr(0, AiChnAttr::default()).unwrap();
    system.aenc().create_chn(0, AencChnAttr::default()).unwrap();
    let (ai, aenc) = (system.ai().endpoint(0), system.aenc().endpoint(0));

    let err = system.bind(ai, aenc).unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));
    assert_eq!(err.status_code(), -2);
    assert_eq!(system.status(ai).unwrap(), ChannelStatus::Ready);
    assert_eq!(system.status(aenc).unwrap(), ChannelStatus::Open);
}

#[test]
fn test_bind_rejects_already_bound_endpoint() {
    let (system, _engine) = system();
    let (vi, venc) = capture_and_encoder(&system);
    system.venc().create_chn(1, VencChnAttr::default()).unwrap();
    let venc1 = system.venc().endpoint(1);

    system.bind(vi, venc).unwrap();

    // Fan-out from a bound source and fan-in to a bound sink are both refused.
    assert!(matches!(
        system.bind(vi, venc1),
        Err(Error::NotReady { .. })
    ));
    assert!(matches!(
        system.bind(venc1, venc),
        Err(Error::NotReady { .. })
    ));
    assert_eq!(system.status(venc1).unwrap(), ChannelStatus::Open);
}

#[test]
fn test_unbind_of_open_pair_changes_nothing() {
    let (system, _engine) = system();
    let (vi, venc) = capture_and_encoder(&system);

    let err = system.unbind(vi, venc).unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));
    assert_eq!(system.status(vi).unwrap(), ChannelStatus::Open);
    assert_eq!(system.status(venc).unwrap(), ChannelStatus::Open);
}

#[test]
fn test_unbind_reversed_direction_rejected() {
    let (system, _engine) = system();
    let (vi, venc) = capture_and_encoder(&system);
    system.bind(vi, venc).unwrap();

    assert!(matches!(
        system.unbind(venc, vi),
        Err(Error::NotReady { .. })
    ));
    assert_eq!(system.peer(vi).unwrap(), Some(BindPeer::Downstream(venc)));
    assert_eq!(system.peer(venc).unwrap(), Some(BindPeer::Upstream(vi)));
}

#[test]
fn test_disable_bound_channel_is_busy() {
    let (system, _engine) = system();
    let (vi, venc) = capture_and_encoder(&system);
    system.bind(vi, venc).unwrap();

    let err = system.vi().disable_chn(0).unwrap_err();
    assert!(matches!(err, Error::Busy { .. }));
    assert_eq!(err.status_code(), -6);
    assert_eq!(system.status(vi).unwrap(), ChannelStatus::Bind);

    system.unbind(vi, venc).unwrap();
    system.vi().disable_chn(0).unwrap();
    assert_eq!(system.status(vi).unwrap(), ChannelStatus::Closed);
}

#[test]
fn test_engine_refusal_leaves_both_open() {
    let (system, engine) = system();
    let (vi, venc) = capture_and_encoder(&system);
    engine.set_fail_connect(true);

    let err = system.bind(vi, venc).unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert_eq!(system.status(vi).unwrap(), ChannelStatus::Open);
    assert_eq!(system.status(venc).unwrap(), ChannelStatus::Open);
    assert_eq!(system.peer(vi).unwrap(), None);

    engine.set_fail_connect(false);
    system.bind(vi, venc).unwrap();
}

#[test]
fn test_unsupported_and_out_of_range_endpoints() {
    let (system, _engine) = system();
    let (vi, _venc) = capture_and_encoder(&system);

    let vo = ChannelEndpoint::new(ModuleId::Vo, 0);
    let err = system.bind(vi, vo).unwrap_err();
    assert!(matches!(err, Error::NotSupported(ModuleId::Vo)));
    assert_eq!(err.status_code(), -7);

    let ao = ChannelEndpoint::new(ModuleId::Ao, 3);
    assert!(matches!(
        system.bind(vi, ao),
        Err(Error::InvalidChannel { .. })
    ));
    assert!(matches!(
        system.bind(vi, vi),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_audio_passthrough_pair() {
    let (system, _engine) = system();
    system.ai().create_chn(0, AiChnAttr::default()).unwrap();
    system.ao().create_chn(0, AoChnAttr::default()).unwrap();
    let (ai, ao) = (system.ai().endpoint(0), system.ao().endpoint(0));

    system.bind(ai, ao).unwrap();
    system.unbind(ai, ao).unwrap();
    system.ai().destroy_chn(0).unwrap();
    system.ao().destroy_chn(0).unwrap();
}

#[test]
fn test_opposite_direction_binds_do_not_deadlock() {
    let (system, _engine) = system();
    let system = Arc::new(system);
    for index in 0..4 {
        system.vi().create_chn(index, ViChnAttr::default()).unwrap();
        system.venc().create_chn(index, VencChnAttr::default()).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let system = Arc::clone(&system);
            thread::spawn(move || {
                let vi = system.vi().endpoint(index);
                let venc = system.venc().endpoint(index);
                for round in 0..200 {
                    // Alternate roles so the two tables are locked from both sides.
                    let (src, dst) = if round % 2 == 0 { (vi, venc) } else { (venc, vi) };
                    system.bind(src, dst).unwrap();
                    system.unbind(src, dst).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for index in 0..4 {
        assert_eq!(
            system.status(system.vi().endpoint(index)).unwrap(),
            ChannelStatus::Open
        );
    }
}
