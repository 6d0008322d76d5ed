#![no_main]

use event_digest_core::digest::digest_stream;
use event_digest_core::sanitize::ByteReplacer;
use event_digest_core::users::UsernameSet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut users = UsernameSet::new();
    let before = users.len();
    match digest_stream(ByteReplacer::nul_to_space(data), &mut users) {
        Ok(count) => assert!(users.len() as u64 <= count + before as u64),
        Err(err) => {
            let partial = err.partial_count().unwrap_or(0);
            assert!(users.len() as u64 <= partial + before as u64);
        }
    }
    for user in &users {
        assert!(!user.as_str().is_empty());
        assert_eq!(user.as_str(), user.as_str().to_lowercase());
    }
});
