use crate::attachment::Attachment;

/// Fixed allowance for everything in a message that is not an attachment
/// part: top-level headers, the multipart preamble and closing boundary.
/// A tunable safety margin, like the per-part overhead.
pub const MESSAGE_OVERHEAD_BYTES: u64 = 4096;

/// Hard limits for one outgoing message, passed explicitly to `pack`.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Maximum cumulative encoded attachment size per message.
    pub max_size: u64,
    /// Maximum number of attachments per message.
    pub max_count: usize,
}

impl BatchLimits {
    /// Derive the attachment budget from the configured per-message cap:
    /// the message overhead and the body text both eat into it.
    pub fn for_message(max_email_size: u64, max_count: usize, body_len: usize) -> Self {
        let max_size = max_email_size.saturating_sub(MESSAGE_OVERHEAD_BYTES + body_len as u64);
        Self { max_size, max_count }
    }
}

/// A size/count-bounded group of attachments destined for one outbound
/// message. `oversized_singleton` marks the one sanctioned size violation:
/// a single attachment that alone exceeds the limit and is sent by itself
/// rather than dropped.
#[derive(Debug, Default)]
pub struct Batch {
    pub attachments: Vec<Attachment>,
    pub encoded_size: u64,
    pub oversized_singleton: bool,
}

impl Batch {
    pub fn count(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    fn push(&mut self, attachment: Attachment) {
        self.encoded_size += attachment.encoded_size;
        self.attachments.push(attachment);
    }
}

/// Partition `attachments` into batches satisfying `limits`, greedily and in
/// input order: the current batch is sealed the moment the next attachment
/// would push it over either limit.
///
/// Zero attachments still produce one empty batch, so the message body is
/// always sent. An attachment too large for any batch becomes its own
/// flagged one-item batch instead of being dropped.
pub fn pack(attachments: Vec<Attachment>, limits: &BatchLimits) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::default();

    for attachment in attachments {
        let over_size = current.encoded_size + attachment.encoded_size > limits.max_size;
        let over_count = current.count() + 1 > limits.max_count;

        if !current.is_empty() && (over_size || over_count) {
            log::debug!(
                "Sealed batch {} ({} attachment(s), {} bytes encoded)",
                batches.len() + 1,
                current.count(),
                current.encoded_size
            );
            batches.push(std::mem::take(&mut current));
        }

        if current.is_empty() && attachment.encoded_size > limits.max_size {
            log::warn!(
                "'{}' alone exceeds the message size limit; sending it in its own message",
                attachment.filename
            );
            current.oversized_singleton = true;
        }

        current.push(attachment);
    }

    // The final batch goes out even when empty: a run with no attachments
    // still delivers the message text.
    if !current.is_empty() || batches.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn att(name: &str, encoded_size: u64) -> Attachment {
        Attachment {
            path: PathBuf::from(name),
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            data: Vec::new(),
            raw_size: encoded_size,
            encoded_size,
        }
    }

    fn limits(max_size: u64, max_count: usize) -> BatchLimits {
        BatchLimits { max_size, max_count }
    }

    fn shape(batches: &[Batch]) -> Vec<Vec<u64>> {
        batches
            .iter()
            .map(|b| b.attachments.iter().map(|a| a.encoded_size).collect())
            .collect()
    }

    #[test]
    fn test_size_limit_forces_split() {
        let batches = pack(vec![att("a", 3), att("b", 4), att("c", 5)], &limits(10, 25));
        assert_eq!(shape(&batches), vec![vec![3, 4], vec![5]]);
        assert_eq!(batches[0].encoded_size, 7);
        assert!(!batches[0].oversized_singleton);
    }

    #[test]
    fn test_count_limit_forces_split_even_when_size_allows_more() {
        let batches = pack(vec![att("a", 3), att("b", 4), att("c", 5)], &limits(100, 2));
        assert_eq!(shape(&batches), vec![vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_oversized_singleton_is_kept_and_flagged() {
        let batches = pack(vec![att("huge", 50)], &limits(10, 25));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].count(), 1);
        assert!(batches[0].oversized_singleton);
    }

    #[test]
    fn test_oversized_attachment_does_not_drag_neighbors_into_its_batch() {
        let batches = pack(vec![att("huge", 12), att("small", 3)], &limits(10, 25));
        assert_eq!(shape(&batches), vec![vec![12], vec![3]]);
        assert!(batches[0].oversized_singleton);
        assert!(!batches[1].oversized_singleton);
    }

    #[test]
    fn test_empty_input_yields_one_empty_batch() {
        let batches = pack(Vec::new(), &limits(10, 25));
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
        assert!(!batches[0].oversized_singleton);
    }

    #[test]
    fn test_order_is_preserved_with_no_loss_or_duplication() {
        let input: Vec<Attachment> =
            (0..17).map(|i| att(&format!("f{}", i), 2 + (i % 5))).collect();
        let names: Vec<String> = input.iter().map(|a| a.filename.clone()).collect();

        let batches = pack(input, &limits(9, 4));
        let repacked: Vec<String> = batches
            .iter()
            .flat_map(|b| b.attachments.iter().map(|a| a.filename.clone()))
            .collect();
        assert_eq!(repacked, names);
    }

    #[test]
    fn test_limits_are_respected_except_flagged_singletons() {
        let input: Vec<Attachment> =
            (0..20).map(|i| att(&format!("f{}", i), 1 + (i * 7) % 13)).collect();
        let lim = limits(20, 3);

        for batch in pack(input, &lim) {
            assert!(batch.count() <= lim.max_count);
            if !batch.oversized_singleton {
                assert!(batch.encoded_size <= lim.max_size);
            }
        }
    }

    #[test]
    fn test_packing_is_greedy_never_splits_early() {
        let input: Vec<Attachment> =
            (0..12).map(|i| att(&format!("f{}", i), 3 + (i % 4) * 2)).collect();
        let lim = limits(15, 5);
        let batches = pack(input, &lim);

        // Every non-final batch must be unable to take the next batch's head
        for pair in batches.windows(2) {
            let (sealed, next) = (&pair[0], &pair[1]);
            let head = &next.attachments[0];
            assert!(
                sealed.encoded_size + head.encoded_size > lim.max_size
                    || sealed.count() + 1 > lim.max_count,
                "batch sealed early: {} + {} within {:?}",
                sealed.encoded_size,
                head.encoded_size,
                lim
            );
        }
    }

    #[test]
    fn test_pack_is_deterministic() {
        let make = || -> Vec<Attachment> {
            (0..10).map(|i| att(&format!("f{}", i), 4 + (i % 3))).collect()
        };
        let first = pack(make(), &limits(11, 4));
        let second = pack(make(), &limits(11, 4));
        assert_eq!(shape(&first), shape(&second));
    }

    #[test]
    fn test_for_message_subtracts_overhead_and_body() {
        let lim = BatchLimits::for_message(10_000_000, 25, 1_000);
        assert_eq!(lim.max_size, 10_000_000 - MESSAGE_OVERHEAD_BYTES - 1_000);
        assert_eq!(lim.max_count, 25);

        // A cap smaller than the overhead saturates instead of wrapping
        let tight = BatchLimits::for_message(100, 25, 50);
        assert_eq!(tight.max_size, 0);
    }
}
