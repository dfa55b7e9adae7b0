mod common;

use std::sync::Arc;

use carafe_orm::{
    ArrayValue, Error, FieldOutput, FieldValue, FindOptions, Manager, ModelActions, OrmContext, RelationType, Value,
};
use common::{Book, MockConfig, Publisher, Recorder, manager, row};
use futures::TryStreamExt;

fn dune() -> carafe_orm::Row {
    row(&[("id", 5.into()), ("title", "Dune".into()), ("publisher_id", 7.into())])
}

fn ace() -> carafe_orm::Row {
    row(&[("id", 7.into()), ("name", "Ace".into())])
}

#[tokio::test]
async fn test_mutual_relations_finalize_concurrently() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _) = manager();

    let (book, publisher) = tokio::join!(manager.get_meta::<Book>(), manager.get_meta::<Publisher>());
    let (book, publisher) = (book?, publisher?);

    let relation = book.data().get_field("publisher").and_then(|f| f.relation()).unwrap();
    assert_eq!(relation.kind(), RelationType::OneToOne);
    assert_eq!(relation.resolved_field()?.name(), "id");

    let books = publisher.data().get_field("books").unwrap();
    assert!(books.is_related());
    assert_eq!(books.relation().unwrap().resolved_field()?.column(), "publisher_id");

    // Memoized: the same instance comes back.
    assert!(Arc::ptr_eq(&book, &manager.get_meta::<Book>().await?));
    Ok(())
}

#[tokio::test]
async fn test_one_to_one_resolves_on_access() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(vec![dune()]);
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;
    assert!(!book.publisher.as_ref().unwrap().is_resolved());

    recorder.push_rows(vec![ace()]);
    let value = book.get_field(&manager, "publisher", FindOptions::default()).await?.into_value().unwrap();
    assert!(matches!(value, FieldValue::Model(_)));

    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "SELECT id, name FROM publisher WHERE id = ? LIMIT 1");
    assert_eq!(params, vec![Value::Int(7)]);

    let publisher = book.publisher.as_ref().and_then(|p| p.model()).unwrap();
    assert_eq!(publisher.name, "Ace");

    // Resolved once, and the key is unchanged.
    book.get_field(&manager, "publisher", FindOptions::default()).await?;
    assert_eq!(recorder.statements().len(), 2);
    assert!(manager.get_hydrator::<Book>()?.get_changes(&book)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_proxy_resolve_directly() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(vec![dune()]);
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    recorder.push_rows(vec![ace()]);
    let proxy = book.publisher.as_mut().unwrap();
    let publisher = proxy.resolve_in_place(&manager).await?;
    assert_eq!(publisher.id, Some(7));
    assert!(proxy.is_resolved());

    // A missing target is reported, not swallowed.
    recorder.push_rows(vec![row(&[("id", 6.into()), ("title", "Emma".into()), ("publisher_id", 99.into())])]);
    let orphan = Book::find_by_pk(&manager, vec![6.into()]).await?;
    let err = orphan.publisher.unwrap().resolve(&manager).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_one_to_many_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(vec![ace()]);
    let mut publisher = Publisher::find_by_pk(&manager, vec![7.into()]).await?;

    let query = publisher
        .get_field(&manager, "books", FindOptions::new().execute(false))
        .await?
        .into_query()
        .unwrap();
    assert_eq!(query.to_sql(), "SELECT id, title, publisher_id FROM book WHERE publisher_id = ?");
    assert_eq!(query.parameters(), vec![Value::Int(7)]);

    recorder.push_rows(vec![dune()]);
    let output = publisher.get_field(&manager, "books", FindOptions::new().limit(5)).await?;
    let FieldOutput::Result(result) = output else {
        panic!("expected an executed lookup");
    };
    assert_eq!(recorder.last().unwrap().0, "SELECT id, title, publisher_id FROM book WHERE publisher_id = ? LIMIT 5");
    let books: Vec<Book> = result.models()?;
    assert_eq!(books[0].title, "Dune");
    Ok(())
}

#[tokio::test]
async fn test_to_array_and_json() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(vec![dune()]);
    let book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    let array = book.to_array(&manager, false).await?;
    assert_eq!(array.keys().collect::<Vec<_>>(), vec!["id", "title", "publisher"]);
    assert_eq!(array.get("publisher"), Some(&ArrayValue::Value(Value::Int(7))));
    assert_eq!(book.to_json(&manager).await?, r#"{"id":5,"title":"Dune","publisher":7}"#);

    recorder.push_rows(vec![ace()]);
    let array = book.to_array(&manager, true).await?;
    let Some(ArrayValue::Model(publisher)) = array.get("publisher") else {
        panic!("publisher was not resolved");
    };
    assert_eq!(publisher.get("name"), Some(&ArrayValue::Value(Value::from("Ace"))));
    assert_eq!(array.to_json()?, r#"{"id":5,"title":"Dune","publisher":{"id":7,"name":"Ace"}}"#);
    Ok(())
}

#[tokio::test]
async fn test_stream_hydrates_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    let second = row(&[("id", 6.into()), ("title", "Emma".into()), ("publisher_id", Value::Null)]);
    recorder.push_rows(vec![dune(), second]);

    let finder = manager.get_finder::<Book>().await?;
    let books: Vec<Book> = finder.query().await?.stream::<Book>().await?.try_collect().await?;
    assert_eq!(books.len(), 2);
    assert_eq!(books[1].title, "Emma");
    assert!(books[1].publisher.is_none());

    let mismatch = finder.query().await?.stream::<Publisher>().await;
    assert!(matches!(mismatch, Err(Error::ModelMismatch { .. })));
    Ok(())
}

#[tokio::test]
async fn test_connections_route_by_model_name() -> Result<(), Box<dyn std::error::Error>> {
    let publishers = Recorder::new();
    let rest = Recorder::new();
    let manager = Manager::new(OrmContext::default());
    manager
        .add_connection(MockConfig(publishers.clone()), "*::Publisher", &[])
        .add_connection(MockConfig(rest.clone()), "*", &[]);

    publishers.push_rows(vec![ace()]);
    Publisher::find_by_pk(&manager, vec![7.into()]).await?;
    Book::find_all(&manager).await?;

    assert_eq!(publishers.sql(), vec!["SELECT id, name FROM publisher WHERE id = ?"]);
    assert_eq!(rest.sql(), vec!["SELECT id, title, publisher_id FROM book"]);
    Ok(())
}
