use ripple_api::{FlushResult, RawFrame};

/// Turns flush results into outbound status frames.
///
/// Total: a failed flush still produces a frame, its payload names the
/// failure. The payload is plain UTF-8 so an operator can tell
/// "N stored" from "store failed" without any schema.
#[derive(Debug, Clone, Copy)]
pub struct StatusEncoder {
    tag: u8,
}

impl StatusEncoder {
    pub fn new(tag: u8) -> Self {
        Self { tag }
    }

    pub fn encode(&self, result: &FlushResult) -> RawFrame {
        RawFrame {
            tag: self.tag,
            payload: status_line(result).into_bytes(),
        }
    }
}

/// Human-readable status of one flush.
pub fn status_line(result: &FlushResult) -> String {
    match &result.outcome {
        Ok(stored) => format!("{} stored in {}", stored.count, stored.target),
        Err(e) => format!("store failed: {}", e.message),
    }
}

#[cfg(test)]
mod tests {
    use ripple_api::{SinkError, Stored};

    use super::*;

    #[test]
    fn success_frame_reports_count_and_target() {
        let result = FlushResult {
            window: 1,
            records: 3,
            outcome: Ok(Stored { count: 3, target: "noises".into() }),
        };
        let frame = StatusEncoder::new(0x10).encode(&result);
        assert_eq!(frame.tag, 0x10);
        assert_eq!(frame.payload, b"3 stored in noises");
    }

    #[test]
    fn failure_frame_carries_cause() {
        let result = FlushResult {
            window: 2,
            records: 5,
            outcome: Err(SinkError::connect("connection refused")),
        };
        let frame = StatusEncoder::new(0x10).encode(&result);
        assert_eq!(frame.payload, b"store failed: connection refused");
    }
}
