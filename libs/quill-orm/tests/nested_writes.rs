// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod common;

use quill_orm::{CreateData, NestedWrite, UpdateData};
use quill_sql::testing::{Event, RecordingExecutor};
use quill_sql::{QueryError, QueryOutput, Value, record};
use test_log::test;

use common::orm;

#[test(tokio::test)]
async fn create_with_a_linked_record() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);

    let created = user
        .create(
            &executor,
            CreateData::new(record! { "name" => "a" })
                .with("profile", NestedWrite::default().create(record! { "bio" => "b" })),
        )
        .await
        .unwrap();

    assert_eq!(created, record! { "id" => 1, "name" => "a" });
    assert_eq!(
        executor.texts(),
        vec![
            r#"INSERT INTO "user"("name") VALUES ($1) RETURNING "user".*"#,
            r#"INSERT INTO "profile"("userId", "bio") VALUES ($1, $2)"#,
        ]
    );
    assert_eq!(executor.statements()[1].values, vec![Value::from(1), Value::from("b")]);
    assert_eq!(executor.events().first(), Some(&Event::Begin));
    assert_eq!(executor.events().last(), Some(&Event::Commit));
    assert_eq!(counters.get(), (1, 0, 0));
}

#[test(tokio::test)]
async fn create_without_relations_skips_the_transaction() {
    let (orm, _) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);

    user.create(&executor, CreateData::new(record! { "name" => "a" }))
        .await
        .unwrap();

    assert!(matches!(&executor.events()[..], [Event::Statement(_)]));
}

#[test(tokio::test)]
async fn batches_creates_across_records() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![
        record! { "id" => 1, "name" => "a" },
        record! { "id" => 2, "name" => "b" },
    ]);

    let data = ["a", "b"]
        .into_iter()
        .map(|name| {
            CreateData::new(record! { "name" => name })
                .with("profile", NestedWrite::default().create(record! { "bio" => name }))
        })
        .collect();
    let created = user.create_many(&executor, data).await.unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(
        executor.texts()[1],
        r#"INSERT INTO "profile"("userId", "bio") VALUES ($1, $2), ($3, $4)"#
    );
    assert_eq!(counters.get(), (1, 0, 0));
}

#[test(tokio::test)]
async fn create_with_a_referenced_record() {
    let (orm, counters) = orm();
    let profile = orm.get_table("profile").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 3, "name" => "a" }]);
    executor.push_rows(vec![record! { "id" => 1, "userId" => 3, "bio" => "b" }]);

    let created = profile
        .create(
            &executor,
            CreateData::new(record! { "bio" => "b" })
                .with("user", NestedWrite::default().create(record! { "name" => "a" })),
        )
        .await
        .unwrap();

    assert_eq!(created["userId"], Value::from(3));
    assert_eq!(
        executor.texts(),
        vec![
            r#"INSERT INTO "user"("name") VALUES ($1) RETURNING "user".*"#,
            r#"INSERT INTO "profile"("bio", "userId") VALUES ($1, $2) RETURNING "profile".*"#,
        ]
    );
    assert_eq!(counters.get(), (1, 0, 0));
}

#[test(tokio::test)]
async fn connect_or_create_creates_the_missing_records_at_once() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![
        record! { "id" => 1, "name" => "a" },
        record! { "id" => 2, "name" => "b" },
    ]);
    executor.push_row_count(1);
    executor.push_row_count(0);

    let data = ["a", "b"]
        .into_iter()
        .map(|name| {
            CreateData::new(record! { "name" => name }).with(
                "profile",
                NestedWrite::default().connect_or_create(
                    record! { "bio" => name },
                    record! { "bio" => name },
                ),
            )
        })
        .collect();
    user.create_many(&executor, data).await.unwrap();

    assert_eq!(
        executor.texts()[1..],
        [
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."bio" = $2"#,
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."bio" = $2"#,
            r#"INSERT INTO "profile"("userId", "bio") VALUES ($1, $2)"#,
        ]
    );
    assert_eq!(counters.get(), (1, 2, 0));
}

#[test(tokio::test)]
async fn create_links_many_to_many_records() {
    let (orm, _) = orm();
    let post = orm.get_table("post").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "userId" => 1, "title" => "t" }]);
    executor.push_rows(vec![record! { "id" => 7 }]);
    executor.push_rows(vec![record! { "id" => 8, "name" => "x" }]);

    post.create(
        &executor,
        CreateData::new(record! { "userId" => 1, "title" => "t" }).with(
            "tags",
            NestedWrite::default()
                .create(record! { "name" => "x" })
                .connect(record! { "id" => 7 }),
        ),
    )
    .await
    .unwrap();

    assert_eq!(
        executor.texts()[1..],
        [
            r#"SELECT "tag"."id" FROM "tag" WHERE "tag"."id" = $1 LIMIT 1"#,
            r#"INSERT INTO "tag"("name") VALUES ($1) RETURNING "tag".*"#,
            r#"INSERT INTO "postTag"("postId", "tagId") VALUES ($1, $2), ($3, $4)"#,
        ]
    );
    assert_eq!(
        executor.statements()[3].values,
        vec![Value::from(1), Value::from(7), Value::from(1), Value::from(8)]
    );
}

#[test(tokio::test)]
async fn create_rejects_update_operations() {
    let (orm, _) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();

    let error = user
        .create(
            &executor,
            CreateData::new(record! { "name" => "a" })
                .with("profile", NestedWrite::default().disconnect()),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, QueryError::Invalid(_)));

    let error = user
        .create(
            &executor,
            CreateData::new(record! { "name" => "a" })
                .with("nope", NestedWrite::default().create(record! {})),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, QueryError::Invalid(_)));

    assert!(executor.events().is_empty());
}

#[test(tokio::test)]
async fn failures_roll_back() {
    let (orm, _) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);
    executor.fail_on(r#"INSERT INTO "profile""#);

    let error = user
        .create(
            &executor,
            CreateData::new(record! { "name" => "a" })
                .with("profile", NestedWrite::default().create(record! { "bio" => "b" })),
        )
        .await
        .unwrap_err();

    assert!(error.to_string().contains("statement failed"));
    let events = executor.events();
    assert!(matches!(
        &events[..],
        [
            Event::Begin,
            Event::Statement(_),
            Event::Statement(_),
            Event::Rollback
        ]
    ));
}

#[test(tokio::test)]
async fn single_record_operations_need_a_single_record() {
    let (orm, _) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();

    for write in [
        NestedWrite::default().set(vec![record! { "id" => 1 }]),
        NestedWrite::default().create(record! { "bio" => "b" }),
        NestedWrite::default().upsert(record! { "bio" => "b" }, record! { "bio" => "b" }),
    ] {
        let error = user
            .update(
                &executor,
                &user.query().where_eq("name", "a"),
                UpdateData::new(record! {}).with("profile", write),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Cardinality(_)));
    }

    let error = user
        .update(
            &executor,
            &user.query().find(1),
            UpdateData::new(record! {}).with(
                "posts",
                NestedWrite::default().upsert(record! {}, record! {}),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, QueryError::Invalid(_)));

    assert!(executor.events().is_empty());
}

#[test(tokio::test)]
async fn disconnect_from_every_record() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![
        record! { "id" => 1, "name" => "a" },
        record! { "id" => 2, "name" => "a" },
    ]);

    let output = user
        .update(
            &executor,
            &user.query().where_eq("name", "a"),
            UpdateData::new(record! {}).with("profile", NestedWrite::default().disconnect()),
        )
        .await
        .unwrap();

    assert_eq!(output, QueryOutput::RowCount(2));
    assert_eq!(
        executor.texts(),
        vec![
            r#"SELECT "user".* FROM "user" WHERE "user"."name" = $1"#,
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."userId" IN ($2, $3)"#,
        ]
    );
    assert_eq!(counters.get(), (0, 1, 0));
}

#[test(tokio::test)]
async fn set_replaces_linked_records() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);

    let output = user
        .update(
            &executor,
            &user.query().find(1),
            UpdateData::new(record! {})
                .with("profile", NestedWrite::default().set(vec![record! { "id" => 5 }])),
        )
        .await
        .unwrap();

    assert_eq!(output, QueryOutput::One(Some(record! { "id" => 1, "name" => "a" })));
    assert_eq!(
        executor.texts(),
        vec![
            r#"SELECT "user".* FROM "user" WHERE "user"."id" = $1 LIMIT 1"#,
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."userId" IN ($2)"#,
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."id" = $2"#,
        ]
    );
    assert_eq!(counters.get(), (0, 2, 0));
}

#[test(tokio::test)]
async fn connect_each_record() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![
        record! { "id" => 1, "name" => "a" },
        record! { "id" => 2, "name" => "a" },
    ]);
    executor.push_row_count(1);
    executor.push_row_count(1);

    user.update(
        &executor,
        &user.query().where_eq("name", "a"),
        UpdateData::new(record! {})
            .with("profile", NestedWrite::default().connect(record! { "id" => 5 })),
    )
    .await
    .unwrap();

    assert_eq!(counters.get(), (0, 2, 0));
}

#[test(tokio::test)]
async fn create_replaces_a_to_one_record() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);
    executor.push_rows(vec![record! { "id" => 1, "name" => "b" }]);

    let output = user.update(
        &executor,
        &user.query().find(1),
        UpdateData::new(record! { "name" => "b" })
            .with("profile", NestedWrite::default().create(record! { "bio" => "b" })),
    )
    .await
    .unwrap();

    assert_eq!(output, QueryOutput::One(Some(record! { "id" => 1, "name" => "b" })));
    assert_eq!(
        executor.texts()[1..],
        [
            r#"UPDATE "user" SET "name" = $1 WHERE "user"."id" = $2 RETURNING "user".*"#,
            r#"UPDATE "profile" SET "userId" = $1 WHERE "profile"."userId" IN ($2)"#,
            r#"INSERT INTO "profile"("userId", "bio") VALUES ($1, $2)"#,
        ]
    );
    assert_eq!(counters.get(), (1, 1, 0));
}

#[test(tokio::test)]
async fn delete_linked_records() {
    let (orm, counters) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![
        record! { "id" => 1, "name" => "a" },
        record! { "id" => 2, "name" => "a" },
    ]);

    user.update(
        &executor,
        &user.query().where_eq("name", "a"),
        UpdateData::new(record! {}).with(
            "profile",
            NestedWrite::default().delete_where(vec![record! { "bio" => "x" }]),
        ),
    )
    .await
    .unwrap();

    assert_eq!(
        executor.texts()[1],
        r#"DELETE FROM "profile" WHERE "profile"."userId" IN ($1, $2) AND "profile"."bio" = $3"#
    );
    assert_eq!(counters.get(), (0, 0, 1));
}

#[test(tokio::test)]
async fn update_of_a_missing_record() {
    let (orm, _) = orm();
    let user = orm.get_table("user").unwrap();
    let executor = RecordingExecutor::new();

    let error = user
        .update(
            &executor,
            &user.query().find(1),
            UpdateData::new(record! {}).with("profile", NestedWrite::default().disconnect()),
        )
        .await
        .unwrap_err();

    assert!(error.is_not_found());
    assert_eq!(executor.events().last(), Some(&Event::Rollback));
}

#[test(tokio::test)]
async fn disconnect_many_to_many_records() {
    let (orm, _) = orm();
    let post = orm.get_table("post").unwrap();
    let executor = RecordingExecutor::new();
    executor.push_rows(vec![record! { "id" => 1, "userId" => 1, "title" => "t" }]);

    post.update(
        &executor,
        &post.query().find(1),
        UpdateData::new(record! {}).with(
            "tags",
            NestedWrite::default().disconnect_where(vec![record! { "name" => "x" }]),
        ),
    )
    .await
    .unwrap();

    assert_eq!(
        executor.texts()[1],
        r#"DELETE FROM "postTag" WHERE "postTag"."postId" IN ($1) AND "postTag"."tagId" IN (SELECT "tag"."id" FROM "tag" WHERE "tag"."name" = $2)"#
    );
}
