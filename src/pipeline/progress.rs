use fable_traits::BookUpdate;
use fable_types::BookStatus;

/// A fixed progress point persisted when a stage starts or finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub status: BookStatus,
    pub progress: u8,
    pub eta: &'static str,
}

impl Checkpoint {
    pub const TEXT_STARTED: Checkpoint = Checkpoint {
        status: BookStatus::GeneratingText,
        progress: 10,
        eta: "10-12 minutes",
    };

    pub const IMAGES_STARTED: Checkpoint = Checkpoint {
        status: BookStatus::GeneratingImages,
        progress: 40,
        eta: "6-8 minutes",
    };

    pub const IMAGES_DONE: Checkpoint = Checkpoint {
        status: BookStatus::ImagesCompleted,
        progress: 80,
        eta: "2-3 minutes",
    };

    pub const PDF_STARTED: Checkpoint = Checkpoint {
        status: BookStatus::GeneratingPdf,
        progress: 80,
        eta: "2-3 minutes",
    };

    pub const COMPLETED: Checkpoint = Checkpoint {
        status: BookStatus::Completed,
        progress: 100,
        eta: "0 minutes",
    };

    pub fn update(&self) -> BookUpdate {
        BookUpdate::status(self.status).with_progress(self.progress, self.eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_never_go_backwards() {
        let path = [
            Checkpoint::TEXT_STARTED,
            Checkpoint::IMAGES_STARTED,
            Checkpoint::IMAGES_DONE,
            Checkpoint::PDF_STARTED,
            Checkpoint::COMPLETED,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress <= pair[1].progress);
            assert!(pair[0].status.can_transition_to(pair[1].status));
        }
    }

    #[test]
    fn test_update_carries_status_and_eta() {
        let update = Checkpoint::IMAGES_STARTED.update();
        assert_eq!(update.status, Some(BookStatus::GeneratingImages));
        assert_eq!(update.progress, Some(40));
        assert_eq!(update.estimated_time_remaining.as_deref(), Some("6-8 minutes"));
    }
}
