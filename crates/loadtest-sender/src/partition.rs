//! Message allotment across producer workers.

/// Per-worker assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTask {
    pub worker_id: usize,
    pub messages_to_process: u64,
}

/// Split `message_count` across `thread_count` workers.
///
/// Every worker gets `message_count / thread_count`; worker 0 additionally
/// absorbs the remainder so the allotments sum to exactly `message_count`.
/// Workers with a zero allotment are still returned.
pub fn allot_messages(message_count: u64, thread_count: usize) -> Vec<WorkerTask> {
    if thread_count == 0 {
        return Vec::new();
    }

    let threads = thread_count as u64;
    let base = message_count / threads;
    let remainder = message_count % threads;

    (0..thread_count)
        .map(|worker_id| WorkerTask {
            worker_id,
            messages_to_process: if worker_id == 0 { base + remainder } else { base },
        })
        .collect()
}

/// Describe the allotment plan for logging.
pub fn describe_allotments(tasks: &[WorkerTask]) -> String {
    let mut lines = Vec::with_capacity(tasks.len() + 1);
    lines.push("Work distribution:".to_string());
    for task in tasks {
        lines.push(format!(
            "  worker {}: {} messages",
            task.worker_id, task.messages_to_process
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(tasks: &[WorkerTask]) -> Vec<u64> {
        tasks.iter().map(|t| t.messages_to_process).collect()
    }

    #[test]
    fn test_remainder_goes_to_worker_zero() {
        let tasks = allot_messages(10, 3);
        assert_eq!(counts(&tasks), vec![4, 3, 3]);
        assert_eq!(tasks[0].worker_id, 0);
        assert_eq!(tasks[2].worker_id, 2);
    }

    #[test]
    fn test_allotments_sum_to_message_count() {
        for message_count in 0..60u64 {
            for thread_count in 1..12usize {
                let tasks = allot_messages(message_count, thread_count);
                assert_eq!(tasks.len(), thread_count);
                assert_eq!(tasks.iter().map(|t| t.messages_to_process).sum::<u64>(), message_count);

                // Only worker 0 may deviate from the base share
                let base = message_count / thread_count as u64;
                assert!(tasks[1..].iter().all(|t| t.messages_to_process == base));
            }
        }
    }

    #[test]
    fn test_fewer_messages_than_workers() {
        assert_eq!(counts(&allot_messages(2, 4)), vec![2, 0, 0, 0]);
    }

    #[test]
    fn test_even_split() {
        assert_eq!(counts(&allot_messages(9, 3)), vec![3, 3, 3]);
        assert_eq!(counts(&allot_messages(5, 1)), vec![5]);
    }

    #[test]
    fn test_zero_threads() {
        assert!(allot_messages(10, 0).is_empty());
    }

    #[test]
    fn test_describe_allotments() {
        let description = describe_allotments(&allot_messages(10, 3));
        assert!(description.contains("worker 0: 4 messages"));
        assert!(description.contains("worker 2: 3 messages"));
    }
}
