mod common;

use carafe_orm::{DatabaseConfig, FindOptions, Manager, ModelActions, ModelType, OrmContext, RelatedProxy, Value};
use common::{Book, Publisher, Visit};

async fn setup() -> Result<Manager, Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let manager = Manager::new(OrmContext::default());
    manager.add_connection(DatabaseConfig::new("sqlite::memory:").max_connections(1), "*", &[]);

    let connection = manager.connection_for(ModelType::of::<Book>(), "find").await?;
    connection
        .execute("CREATE TABLE publisher (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)", &[])
        .await?;
    connection
        .execute(
            "CREATE TABLE book (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, publisher_id INTEGER)",
            &[],
        )
        .await?;
    connection
        .execute("CREATE TABLE visit (id INTEGER PRIMARY KEY AUTOINCREMENT, note TEXT)", &[])
        .await?;
    Ok(manager)
}

#[tokio::test]
async fn test_lifecycle_against_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let manager = setup().await?;

    let mut publisher = Publisher { name: "Ace".to_string(), ..Default::default() };
    publisher.save(&manager).await?;
    assert_eq!(publisher.id, Some(1));

    let mut book = Book {
        title: "Dune".to_string(),
        publisher: Some(RelatedProxy::resolved(publisher)),
        ..Default::default()
    };
    book.save(&manager).await?;
    assert_eq!(book.id, Some(1));

    let mut loaded = Book::find_by_pk(&manager, vec![1.into()]).await?;
    assert_eq!(loaded.title, "Dune");
    assert_eq!(loaded.publisher.as_ref().and_then(|p| p.raw_value()), Some(&Value::Int(1)));

    loaded.get_field(&manager, "publisher", FindOptions::default()).await?;
    let related = loaded.publisher.as_ref().and_then(|p| p.model()).map(|p| p.name.clone());
    assert_eq!(related.as_deref(), Some("Ace"));

    loaded.title = "Dune Messiah".to_string();
    loaded.save(&manager).await?;
    let reloaded = Book::find_by_pk(&manager, vec![1.into()]).await?;
    assert_eq!(reloaded.title, "Dune Messiah");

    let mut ace = Publisher::find_by_pk(&manager, vec![1.into()]).await?;
    let books = ace.get_field(&manager, "books", FindOptions::default()).await?.into_result().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books.models::<Book>()?[0].title, "Dune Messiah");

    assert!(loaded.delete(&manager).await?);
    assert!(Book::find_all(&manager).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_null_foreign_key_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let manager = setup().await?;

    let mut book = Book { title: "Emma".to_string(), ..Default::default() };
    book.insert(&manager).await?;

    let loaded = Book::find_first_by(&manager, vec![("title".to_string(), "Emma".into())]).await?;
    assert_eq!(loaded.id, book.id);
    assert!(loaded.publisher.is_none());
    assert_eq!(loaded.to_json(&manager).await?, r#"{"id":1,"title":"Emma","publisher":null}"#);
    Ok(())
}

#[tokio::test]
async fn test_second_save_updates_the_inserted_row() -> Result<(), Box<dyn std::error::Error>> {
    let manager = setup().await?;

    let mut first = Publisher { name: "Ace".to_string(), ..Default::default() };
    first.save(&manager).await?;
    let mut second = Publisher { name: "Tor".to_string(), ..Default::default() };
    second.save(&manager).await?;
    assert_eq!((first.id, second.id), (Some(1), Some(2)));

    first.name = "Ace Books".to_string();
    first.save(&manager).await?;

    let publishers = Publisher::find_all(&manager).await?;
    assert_eq!(publishers.len(), 2);
    let renamed = Publisher::find_by_pk(&manager, vec![1.into()]).await?;
    assert_eq!(renamed.name, "Ace Books");
    Ok(())
}

#[tokio::test]
async fn test_insert_with_default_values() -> Result<(), Box<dyn std::error::Error>> {
    let manager = setup().await?;

    let mut visit = Visit::default();
    visit.save(&manager).await?;
    assert_eq!(visit.id, Some(1));

    let loaded = Visit::find_by_pk(&manager, vec![1.into()]).await?;
    assert!(loaded.note.is_none());
    Ok(())
}
