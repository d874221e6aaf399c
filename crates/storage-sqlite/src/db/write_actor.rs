//! Single writer for the SQLite database.
//!
//! Every write job runs on one dedicated connection inside an immediate
//! transaction, in submission order. Readers use the pool directly.

use std::any::Any;
use std::thread;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use sheetsync_core::errors::{Error, Result};

use crate::errors::StorageError;

use super::DbPool;

type JobOutput = Box<dyn Any + Send>;
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> Result<JobOutput> + Send>;

const QUEUE_CAPACITY: usize = 256;

struct WriteRequest {
    job: Job,
    reply: oneshot::Sender<Result<JobOutput>>,
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside a transaction.
    ///
    /// Any error returned by the job rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| job(conn).map(|value| Box::new(value) as JobOutput));

        self.tx
            .send(WriteRequest { job, reply })
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer stopped".to_string()))?;

        let output = response
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer dropped the job".to_string()))??;

        output.downcast::<T>().map(|value| *value).map_err(|_| {
            Error::from(StorageError::WriterUnavailable(
                "writer returned an unexpected type".to_string(),
            ))
        })
    }
}

/// Starts the writer thread holding one pooled connection.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<WriteRequest>(QUEUE_CAPACITY);

    thread::spawn(move || {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Database writer could not acquire a connection: {}", e);
                return;
            }
        };
        debug!("Database writer started");

        while let Some(WriteRequest { job, reply }) = rx.blocking_recv() {
            let result = conn
                .immediate_transaction::<_, StorageError, _>(|tx| {
                    job(tx).map_err(StorageError::Domain)
                })
                .map_err(Error::from);
            let _ = reply.send(result);
        }
        debug!("Database writer stopped");
    });

    WriteHandle { tx }
}
