mod event;
mod sink;

use std::sync::Arc;

pub use event::*;
pub use sink::*;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        sink.emit(MirrorEvent::Fetch {
            mirror: "wheezy-main".to_string(),
            stage: FetchStage::Release,
        });
    }

    #[test]
    fn test_collector_sink() {
        let sink = CollectorSink::default();
        assert!(sink.is_empty());

        sink.emit(MirrorEvent::Fetch {
            mirror: "wheezy-main".to_string(),
            stage: FetchStage::SignatureSkipped,
        });
        sink.emit(MirrorEvent::DownloadComplete {
            mirror: "wheezy-main".to_string(),
            package_count: 2,
        });

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert!(matches!(
            &events[0],
            MirrorEvent::Fetch {
                stage: FetchStage::SignatureSkipped,
                ..
            }
        ));
        assert!(matches!(
            &events[1],
            MirrorEvent::DownloadComplete {
                package_count: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_event_sink_handle() {
        let collector = Arc::new(CollectorSink::default());
        let sink: EventSinkHandle = collector.clone();
        sink.emit(MirrorEvent::ChecksumAnomaly {
            mirror: "m".into(),
            url: "http://x/Packages".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        });
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_event_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NullSink>();
        assert_send_sync::<CollectorSink>();
    }
}
