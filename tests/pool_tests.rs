// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Tests for buffer and object pooling

use mcp_runtime::{
    core::pool::{BufferPool, ObjectPool, PoolConfig, Reset, SizeClass, global_buffers},
    protocol::{JsonCodec, types::JsonRpcNotification},
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[cfg(test)]
mod pool_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let pool = BufferPool::default();
        {
            let mut buffer = pool.get(100);
            buffer.fill(0xFF);
            assert_eq!(buffer.class(), Some(SizeClass::Small));
        }
        assert_eq!(pool.idle(SizeClass::Small), 1);

        let buffer = pool.get(100);
        assert_eq!(buffer.len(), 100);
        assert!(buffer.iter().all(|byte| *byte == 0));
        assert_eq!(pool.stats(SizeClass::Small).hits(), 1);
        assert_eq!(pool.stats(SizeClass::Small).misses(), 1);
    }

    #[test]
    fn test_scratch_is_empty_with_class_capacity() {
        let pool = BufferPool::default();
        let scratch = pool.scratch(2000);
        assert!(scratch.is_empty());
        assert_eq!(scratch.class(), Some(SizeClass::Medium));
        assert!(scratch.capacity() >= SizeClass::Medium.capacity());
    }

    #[test]
    fn test_oversized_buffers_are_not_pooled() {
        let pool = BufferPool::default();
        let size = SizeClass::Large.capacity() + 1;
        {
            let buffer = pool.get(size);
            assert_eq!(buffer.class(), None);
            assert_eq!(buffer.len(), size);
        }
        assert_eq!(pool.stats(SizeClass::Large).unpooled(), 1);
        assert_eq!(pool.idle(SizeClass::Large), 0);
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool = BufferPool::default();
        let owned: Vec<u8> = pool.get(10).into_inner();
        assert_eq!(owned.len(), 10);
        assert_eq!(pool.idle(SizeClass::Small), 0);
    }

    #[test]
    fn test_idle_is_capped() {
        let pool = BufferPool::new(PoolConfig {
            max_idle_per_class: 2,
        });
        let held: Vec<_> = (0..5).map(|_| pool.get(8)).collect();
        drop(held);
        assert_eq!(pool.idle(SizeClass::Small), 2);
    }

    #[derive(Default)]
    struct Scratchpad {
        notes: Vec<String>,
        dirty: bool,
    }

    impl Reset for Scratchpad {
        fn reset(&mut self) {
            self.notes.clear();
            self.dirty = false;
        }
    }

    #[test]
    fn test_object_pool_resets_on_return() {
        let pool = ObjectPool::new(4, Scratchpad::default);
        let mut pad = pool.take();
        pad.notes.push("draft".to_string());
        pad.dirty = true;
        pool.put(pad);

        let pad = pool.take();
        assert!(pad.notes.is_empty());
        assert!(!pad.dirty);
        assert_eq!(pool.stats().hits(), 1);
    }

    #[test]
    fn test_concurrent_borrowers() {
        let pool = BufferPool::new(PoolConfig {
            max_idle_per_class: 4,
        });
        let threads: Vec<_> = (0..8)
            .map(|n| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buffer = pool.get(64);
                        assert!(buffer.iter().all(|byte| *byte == 0));
                        buffer.fill(n as u8 + 1);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let stats = pool.stats(SizeClass::Small);
        assert_eq!(stats.hits() + stats.misses(), 800);
        assert!(pool.idle(SizeClass::Small) <= 4);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let first: *const BufferPool = global_buffers();
        let second: *const BufferPool = global_buffers();
        assert!(std::ptr::eq(first, second));

        let buffer = global_buffers().get(32);
        assert_eq!(buffer.len(), 32);
    }

    #[test]
    fn test_codec_clones_share_scratch() {
        let codec = JsonCodec::default();
        let clone = codec.clone();
        let notification = JsonRpcNotification::new("notifications/prompts/list_changed", None);

        clone.encode_line(&notification).unwrap();
        assert_eq!(codec.idle_buffers(), 1);

        let shared = Arc::new(codec);
        let text = shared.encode(&notification).unwrap();
        assert!(!text.ends_with('\n'));
        assert_eq!(shared.idle_buffers(), 1);
    }
}
