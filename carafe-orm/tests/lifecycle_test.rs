mod common;

use carafe_orm::{
    Changes, Direction, Error, ErrorKind, FieldValue, FindArgs, FindOptions, FindOutput, Model, ModelActions, Op,
    QueryResult, Value,
};
use common::{Book, Visit, manager, row};

#[derive(Model, Debug, Default)]
struct Tag {
    #[orm(primary_key)]
    code: String,
    label: String,
    changes: Changes,
}

#[derive(Model, Debug, Default)]
struct AuditEntry {
    message: String,
    changes: Changes,
}

#[derive(Model, Debug, Default)]
#[orm(index(unique, fields("book", "reader")))]
struct Loan {
    #[orm(column = "book_id", relation(one_to_one, model = Book, field = "id"))]
    book: Option<carafe_orm::RelatedProxy<Book>>,
    reader: String,
    changes: Changes,
}

fn dune() -> Vec<carafe_orm::Row> {
    vec![row(&[("id", 5.into()), ("title", "Dune".into()), ("publisher_id", 7.into())])]
}

#[tokio::test]
async fn test_find_by_pk_hydrates_and_tracks() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());

    let book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    assert_eq!(book.id, Some(5));
    assert_eq!(book.title, "Dune");
    assert_eq!(book.publisher.as_ref().and_then(|p| p.raw_value()), Some(&Value::Int(7)));
    assert!(book.changes.is_tracked());

    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "SELECT id, title, publisher_id FROM book WHERE id = ?");
    assert_eq!(params, vec![Value::Int(5)]);
    Ok(())
}

#[tokio::test]
async fn test_find_by_pk_errors() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();

    let err = Book::find_by_pk(&manager, vec![]).await.unwrap_err();
    assert!(matches!(err, Error::ArgumentCountMismatch { expected: 1, received: 0, .. }));

    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let err = Book::find_by_pk(&manager, vec![FieldValue::Date(date)]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = AuditEntry::find_by_pk(&manager, vec![1.into()]).await.unwrap_err();
    assert!(matches!(err, Error::NoPrimaryIndex(_)));

    // No statement ran so far; an empty result is a miss.
    assert!(recorder.statements().is_empty());
    let err = Book::find_by_pk(&manager, vec![5.into()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(&err, Error::NotFound { criteria, .. } if criteria == "id = 5"));
    Ok(())
}

#[tokio::test]
async fn test_find_with_options() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();

    let options = FindOptions::new()
        .filter("title", Op::Like, "D%")
        .order_by("id", Direction::Desc)
        .limit(10)
        .offset(5);
    let qb = Book::find(&manager, options).await?.into_query().unwrap();
    assert_eq!(qb.to_sql(), "SELECT id, title, publisher_id FROM book WHERE title LIKE ? ORDER BY id DESC LIMIT 10 OFFSET 5");
    assert_eq!(qb.parameters(), vec![Value::from("D%")]);

    let qb = Book::find(&manager, FindOptions::new().where_eq("publisher", FieldValue::NULL).offset(20))
        .await?
        .into_query()
        .unwrap();
    assert_eq!(qb.to_sql(), "SELECT id, title, publisher_id FROM book WHERE publisher_id IS NULL LIMIT -1 OFFSET 20");
    assert!(qb.parameters().is_empty());

    // Nothing executes until asked to.
    assert!(recorder.statements().is_empty());

    recorder.push_rows(dune());
    let result = Book::find(&manager, FindOptions::new().where_eq("id", 5).execute(true)).await?.into_result().unwrap();
    let books: Vec<Book> = result.models()?;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Dune");
    Ok(())
}

#[tokio::test]
async fn test_find_unknown_field_fails() {
    let (manager, _) = manager();
    let err = Book::find(&manager, FindOptions::new().where_eq("isbn", "x")).await.unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }));
}

#[tokio::test]
async fn test_invoke_find_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());

    match manager.invoke_find::<Book>("ByPk", FindArgs::Keys(vec![5.into()])).await? {
        FindOutput::Model(book) => assert_eq!(book.title, "Dune"),
        other => panic!("unexpected {:?}", other),
    }

    recorder.push_rows(dune());
    let fields = vec![("title".to_string(), FieldValue::from("Dune"))];
    let output = manager.invoke_find::<Book>("firstby", FindArgs::Fields(fields)).await?;
    assert!(matches!(output, FindOutput::Model(_)));
    assert_eq!(recorder.last().unwrap().0, "SELECT id, title, publisher_id FROM book WHERE title = ? LIMIT 1");

    let err = manager.invoke_find::<Book>("ByIsbn", FindArgs::None).await.unwrap_err();
    assert!(matches!(err, Error::UndefinedFindMethod { .. }));

    let err = manager.invoke_find::<Book>("ByPk", FindArgs::None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    Ok(())
}

#[tokio::test]
async fn test_save_inserts_then_updates_changes_only() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();

    let mut book = Book { title: "Dune".to_string(), ..Default::default() };
    recorder.push(QueryResult { insert_id: Some(3), affected_rows: 1, ..Default::default() });
    book.save(&manager).await?;

    assert_eq!(book.id, Some(3));
    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "INSERT INTO book (title) VALUES (?)");
    assert_eq!(params, vec![Value::from("Dune")]);

    // Unchanged: nothing to run.
    book.save(&manager).await?;
    assert_eq!(recorder.statements().len(), 1);

    book.title = "Dune Messiah".to_string();
    let changes = manager.get_hydrator::<Book>()?.get_changes(&book)?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field.name(), "title");
    assert_eq!(changes[0].previous, Value::from("Dune"));

    book.save(&manager).await?;
    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "UPDATE book SET title = ? WHERE id = ?");
    assert_eq!(params, vec![Value::from("Dune Messiah"), Value::Int(3)]);
    assert!(manager.get_hydrator::<Book>()?.get_changes(&book)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_save_strategy_errors_and_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();

    let mut tag = Tag { code: "sf".to_string(), label: "Science fiction".to_string(), ..Default::default() };
    let err = tag.save(&manager).await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousSaveStrategy(_)));

    tag.insert(&manager).await?;
    assert_eq!(recorder.last().unwrap().0, "INSERT INTO tag (code, label) VALUES (?, ?)");

    // Without a primary index save always inserts.
    let mut entry = AuditEntry { message: "created".to_string(), ..Default::default() };
    entry.save(&manager).await?;
    assert_eq!(recorder.last().unwrap().0, "INSERT INTO audit_entry (message) VALUES (?)");

    entry.message = "updated".to_string();
    let err = entry.update(&manager).await.unwrap_err();
    assert!(matches!(err, Error::NoUsableIndex { .. }));
    Ok(())
}

#[tokio::test]
async fn test_delete_by_key_index() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    recorder.push(QueryResult::with_affected_rows(1));
    assert!(book.delete(&manager).await?);
    assert!(!book.changes.is_tracked());

    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "DELETE FROM book WHERE id = ?");
    assert_eq!(params, vec![Value::Int(5)]);

    assert!(!book.delete(&manager).await?);
    Ok(())
}

#[tokio::test]
async fn test_assign_does_not_touch_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    book.assign(&manager, row(&[("title", "Children of Dune".into())])).await?;
    assert_eq!(book.title, "Children of Dune");
    assert_eq!(book.id, Some(5));

    let changes = manager.get_hydrator::<Book>()?.get_changes(&book)?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].current, Value::from("Children of Dune"));
    Ok(())
}

#[tokio::test]
async fn test_assign_ignores_unknown_keys() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    book.assign(&manager, row(&[("title", "Heretics of Dune".into()), ("csrf_token", "abc".into())])).await?;
    assert_eq!(book.title, "Heretics of Dune");
    Ok(())
}

#[tokio::test]
async fn test_failed_assign_leaves_model_intact() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(dune());
    let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;

    let err = book
        .assign(&manager, row(&[("id", 9.into()), ("title", Value::Null)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NullNotAllowed { .. }));

    assert_eq!(book.id, Some(5));
    assert_eq!(book.title, "Dune");
    assert_eq!(book.publisher.as_ref().and_then(|p| p.raw_value()), Some(&Value::Int(7)));
    assert!(book.changes.is_tracked());
    assert!(manager.get_hydrator::<Book>()?.get_changes(&book)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_insert_with_only_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();

    let mut visit = Visit::default();
    recorder.push(QueryResult { insert_id: Some(4), affected_rows: 1, ..Default::default() });
    visit.save(&manager).await?;

    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "INSERT INTO visit DEFAULT VALUES");
    assert!(params.is_empty());
    assert_eq!(visit.id, Some(4));
    Ok(())
}

#[tokio::test]
async fn test_delete_by_relation_key() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, recorder) = manager();
    recorder.push_rows(vec![row(&[("book_id", 5.into()), ("reader", "ann".into())])]);
    let mut loan = Loan::find_first_by(&manager, vec![("reader".to_string(), "ann".into())]).await?;

    recorder.push(QueryResult::with_affected_rows(1));
    assert!(loan.delete(&manager).await?);

    let (sql, params) = recorder.last().unwrap();
    assert_eq!(sql, "DELETE FROM loan WHERE book_id = ? AND reader = ?");
    assert_eq!(params, vec![Value::Int(5), Value::from("ann")]);
    Ok(())
}

#[tokio::test]
async fn test_set_field_casts_values() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _) = manager();
    let mut book = Book::default();

    book.set_field(&manager, "id", "42".into()).await?;
    assert_eq!(book.id, Some(42));

    let err = book.set_field(&manager, "title", FieldValue::NULL).await.unwrap_err();
    assert!(matches!(err, Error::NullNotAllowed { .. }));
    Ok(())
}
