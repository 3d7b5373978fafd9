mod common;

use common::stub_registry;
use ffdyn::Component;
use ffdyn::abi::MediaType;
use ffdyn::avfilter::PadInfo;

#[test]
fn build_information() {
    let (registry, _) = stub_registry();
    let info = registry.avfilter().info().unwrap();

    assert_eq!(info.component, Component::AvFilter);
    assert_eq!(info.version.major, 7);
    assert_eq!(info.license, "LGPL version 2.1 or later");
}

#[test]
fn filter_with_static_pads() {
    let (registry, _) = stub_registry();
    let filter = registry.avfilter().filter("anull").unwrap().unwrap();

    assert_eq!(filter.name, "anull");
    assert_eq!(filter.description, "Pass the source unchanged to the output.");
    let audio = PadInfo {
        name: "default".to_string(),
        media_type: Some(MediaType::Audio),
    };
    assert_eq!(filter.inputs, [audio.clone()]);
    assert_eq!(filter.outputs, [audio]);
    assert_eq!(filter.flag_names(), ["timeline_generic"]);
}

#[test]
fn dynamic_outputs_have_no_static_pads() {
    let (registry, _) = stub_registry();
    let split = registry.avfilter().filter("split").unwrap().unwrap();

    assert_eq!(split.inputs.len(), 1);
    assert!(split.outputs.is_empty());
    assert_eq!(split.flag_names(), ["dynamic_outputs"]);
}

#[test]
fn unknown_filter_is_none() {
    let (registry, _) = stub_registry();
    assert_eq!(registry.avfilter().filter("zscale").unwrap(), None);
}

#[test]
fn iterates_every_filter() {
    let (registry, counters) = stub_registry();
    let avfilter = registry.avfilter();

    let names = avfilter.filter_names().unwrap();
    assert_eq!(names, ["null", "anull", "nullsink", "split"]);

    assert_eq!(avfilter.filter_names().unwrap(), names);
    assert_eq!(counters.lookups_of("av_filter_iterate"), 1);
    // libavutil was never needed.
    assert!(!registry.is_open(Component::AvUtil));
}
