//! Fuzz testing for untrusted buffer re-attachment.
//!
//! Arbitrary byte blocks must either be rejected with an error or produce an
//! instance whose every read completes without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

use scmo::ScmoInstance;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1 << 16 {
        return;
    }
    let Ok(inst) = ScmoInstance::from_raw_parts(data.to_vec(), None, Vec::new()) else {
        return;
    };
    let _ = inst.host();
    let _ = inst.namespace();
    let _ = inst.class_name();
    for idx in 0..inst.property_count() {
        let _ = inst.property_name_at(idx);
        let _ = inst.property_at(idx);
    }
    for idx in 0..inst.key_binding_count() {
        let _ = inst.key_binding_at(idx);
    }
    let _ = inst.to_object_path();
    let _ = inst.to_cim_instance();
});
