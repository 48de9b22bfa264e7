mod common;

use common::{config, generation_config, load_pdf, request};
use fable::storage::{FilesystemArtifactStorage, FilesystemBookStore};
use fable::{App, BookStatus};
use fable_generation::GenerationClient;
use fable_traits::{BookStore, ImageSize, QueueEvent};
use fable_types::Book;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_offline_client_produces_a_book_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let store = Arc::new(FilesystemBookStore::new(config.storage.books_dir()).await.unwrap());
    let artifacts = Arc::new(FilesystemArtifactStorage::new(config.storage.pdfs_dir()).await.unwrap());
    let generation = fable_generation::GenerationConfig {
        image_size: ImageSize::new(256, 256),
        ..generation_config()
    };
    let generator = Arc::new(GenerationClient::offline(config.storage.images_dir(), generation));
    let app = App::with_parts(&config, store.clone(), generator, artifacts);

    let mut events = app.subscribe();
    let created = app.service().create_book(request()).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(120), App::wait_for(&mut events, created.id))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, QueueEvent::Completed { .. }), "{:?}", event);
    app.shutdown().await;

    let book = store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(book.status, BookStatus::Completed);
    // The offline text provider is never available, so the template story is used.
    assert!(book.metadata.fallback_story);
    assert_eq!(book.metadata.fallback_images, 0);
    for page in &book.pages {
        let reference = page.image_ref.as_deref().unwrap();
        assert!(reference.ends_with(".png"), "{}", reference);
        assert!(std::path::Path::new(reference).exists());
    }

    let record = config.storage.books_dir().join(format!("{}.json", book.id));
    let on_disk: Book = serde_json::from_slice(&std::fs::read(record).unwrap()).unwrap();
    assert_eq!(on_disk, book);

    let location = book.pdf_location.as_deref().unwrap();
    assert!(location.starts_with(config.storage.pdfs_dir().to_str().unwrap()));
    assert_eq!(load_pdf(location).get_pages().len(), book.pages.len() + 2);
    // Scratch images are cleaned once the document is written.
    assert!(!config.storage.work_dir().join(book.id.to_string()).exists());
}
