use allocledger_core::{
    AllocKind, FreeOutcome, Origin, global_tracker, track_alloc, track_delete, track_free,
    track_new, track_report,
};

// Single test: the global tracker is shared by every test in this binary.
#[test]
fn macros_route_through_global_tracker_with_call_site() {
    let p = track_alloc!(32).expect("alloc");
    let line = line!() - 1;
    let here = Origin::new("global_macros_test.rs", line);

    let rec_origin = global_tracker().with(|t| t.record_for(p.as_ptr()).map(|r| r.origin));
    assert_eq!(rec_origin, Some(here));

    assert_eq!(track_free!(p.as_ptr()), Ok(FreeOutcome::Released));
    assert_eq!(track_free!(p.as_ptr()), Ok(FreeOutcome::DoubleFree));
    assert_eq!(track_free!(std::ptr::null_mut::<u8>()), Ok(FreeOutcome::Null));

    let obj = track_new!(48).expect("new");
    let kind = global_tracker().with(|t| t.record_for(obj.as_ptr()).map(|r| r.kind));
    assert_eq!(kind, Some(AllocKind::New));
    assert_eq!(track_delete!(obj.as_ptr()), Ok(FreeOutcome::Released));

    let leak = track_alloc!(7).expect("alloc");

    let mut out = Vec::new();
    track_report!(&mut out).expect("report");
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("Total News:          1"));
    assert!(text.contains("Total Deletes:       1"));
    assert!(text.contains("DOUBLE FREE:"));
    assert!(text.contains("global_macros_test.rs:"));
    assert!(text.contains("(7 bytes)"));

    assert_eq!(track_free!(leak.as_ptr()), Ok(FreeOutcome::Released));
}
