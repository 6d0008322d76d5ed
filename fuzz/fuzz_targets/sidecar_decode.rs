#![no_main]

use event_digest_core::digest::Digest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any sidecar that decodes must survive a re-encode unchanged.
    if let Ok(digest) = serde_json::from_slice::<Digest>(data) {
        let encoded = serde_json::to_vec(&digest).expect("encode digest");
        let again: Digest = serde_json::from_slice(&encoded).expect("decode re-encoded digest");
        assert_eq!(digest, again);
    }
});
