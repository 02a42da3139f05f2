use mongodb::{
    Client, Collection, IndexModel,
    bson::doc,
    options::{ClientOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};

pub const CHEATING_LOG_COLLECTION: &str = "CheatingLog";
pub const EXAM_ATTEMPT_COLLECTION: &str = "ExamAttempt";
pub const EXAM_COLLECTION: &str = "Exam";
pub const QUESTION_COLLECTION: &str = "Question";

pub async fn get_collection<'d, T>(client: &Client, collection_name: &str) -> Collection<T>
where
    T: Send + Sync + Deserialize<'d> + Serialize,
{
    let db = client
        .default_database()
        .expect("database needs to be defined in the URI");

    db.collection::<T>(collection_name)
}

pub async fn client(uri: &str) -> mongodb::error::Result<Client> {
    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.app_name = Some(env!("CARGO_CRATE_NAME").to_string());

    let client = Client::with_options(client_options)?;

    // Ping the server to see if you can connect to the cluster
    client
        .default_database()
        .expect("database needs to be defined in the URI")
        .run_command(doc! {"ping": 1})
        .await?;

    Ok(client)
}

/// Creates the unique indexes the aggregator and attempt tracker rely on:
/// one `CheatingLog` per (examId, email), one `ExamAttempt` per
/// (examId, userId). Safe to call on every startup.
pub async fn ensure_indexes(client: &Client) -> mongodb::error::Result<()> {
    let logs =
        get_collection::<crate::CheatingLog>(client, CHEATING_LOG_COLLECTION).await;
    logs.create_index(
        IndexModel::builder()
            .keys(doc! {"examId": 1, "email": 1})
            .options(IndexOptions::builder().unique(true).build())
            .build(),
    )
    .await?;

    let attempts =
        get_collection::<crate::ExamAttempt>(client, EXAM_ATTEMPT_COLLECTION).await;
    attempts
        .create_index(
            IndexModel::builder()
                .keys(doc! {"examId": 1, "userId": 1})
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    Ok(())
}
