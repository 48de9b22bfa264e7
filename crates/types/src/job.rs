use crate::ids::BookId;
use crate::request::{CreationRequest, ValidationError};
use serde::{Deserialize, Serialize};

/// Payload of a book generation job.
///
/// Only constructible through [`BookJob::new`], which validates the request, so a
/// worker never sees a payload with missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookJob {
    book_id: BookId,
    request: CreationRequest,
}

impl BookJob {
    pub const KIND: &'static str = "generate-book";

    pub fn new(book_id: BookId, request: CreationRequest) -> Result<Self, ValidationError> {
        request.validate()?;
        Ok(Self { book_id, request })
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn request(&self) -> &CreationRequest {
        &self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::sample_request;

    #[test]
    fn test_job_rejects_invalid_request() {
        let mut req = sample_request();
        req.setting.clear();
        assert_eq!(
            BookJob::new(BookId::new(), req),
            Err(ValidationError::MissingField("setting"))
        );
    }

    #[test]
    fn test_job_keeps_book_id() {
        let id = BookId::new();
        let job = BookJob::new(id, sample_request()).unwrap();
        assert_eq!(job.book_id(), id);
        assert_eq!(job.request().title, "Luna and the Moon Garden");
    }
}
