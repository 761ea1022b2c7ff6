//! Chunked file download service.
//!
//! Accepts the platform's transfer operations, drives one chunk assembler
//! at a time, persists finished files in the file repository and reports
//! every outcome back as a `FileUploadStatus`. Completed table entries are
//! reaped by a background garbage-collector task.

use crate::publish::OutboundMessageHandler;
use crate::services::downloader::{ChunkOutcome, FileDownloader};
use edge_bridge_models::{
    BinaryData, FileDelete, FileInfo, FileList, FilePacketRequest, FileTransferError,
    FileTransferStatus, FileUploadAbort, FileUploadInitiate, FileUploadStatus, Message,
};
use edge_bridge_protocol::FileTransferProtocol;
use edge_bridge_repository::FileRepository;
use edge_bridge_utils::hash::base64_decode;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct ActiveDownload {
    expected_hash: String,
    downloader: FileDownloader,
    completed: bool,
}

pub struct FileDownloadService {
    gateway_key: String,
    max_file_size: u64,
    max_packet_size: u64,
    download_directory: PathBuf,
    platform_outbound: Arc<dyn OutboundMessageHandler>,
    file_repository: Arc<FileRepository>,
    downloads: Mutex<HashMap<String, ActiveDownload>>,
    /// Name of the transfer currently progressing; empty when idle.
    active_download: Mutex<String>,
    gc_wake: Arc<Notify>,
    cancel: CancellationToken,
    gc_worker: StdMutex<Option<JoinHandle<()>>>,
}

impl FileDownloadService {
    pub fn new(
        gateway_key: impl Into<String>,
        max_file_size: u64,
        max_packet_size: u64,
        download_directory: impl Into<PathBuf>,
        platform_outbound: Arc<dyn OutboundMessageHandler>,
        file_repository: Arc<FileRepository>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway_key: gateway_key.into(),
            max_file_size,
            max_packet_size,
            download_directory: download_directory.into(),
            platform_outbound,
            file_repository,
            downloads: Mutex::new(HashMap::new()),
            active_download: Mutex::new(String::new()),
            gc_wake: Arc::new(Notify::new()),
            cancel,
            gc_worker: StdMutex::new(None),
        })
    }

    /// Spawn the garbage collector reaping completed downloads.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = this.gc_wake.notified() => {
                        let mut downloads = this.downloads.lock().await;
                        downloads.retain(|name, entry| {
                            if entry.completed {
                                debug!(file = %name, "Removing completed download");
                            }
                            !entry.completed
                        });
                    }
                }
            }
        });
        *self.gc_worker.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        let handle = self.gc_worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Name of the transfer in progress; empty when idle. Test hook.
    pub async fn active_download(&self) -> String {
        self.active_download.lock().await.clone()
    }

    pub async fn platform_message_received(&self, message: &Message) {
        if let Some(chunk) = FileTransferProtocol::make_binary_data(message) {
            self.handle_binary_data(chunk).await;
            return;
        }
        if let Some(initiate) = FileTransferProtocol::make_file_upload_initiate(message) {
            self.handle_upload_initiate(initiate).await;
            return;
        }
        if let Some(abort) = FileTransferProtocol::make_file_upload_abort(message) {
            self.handle_upload_abort(abort).await;
            return;
        }
        if let Some(delete) = FileTransferProtocol::make_file_delete(message) {
            self.handle_file_delete(delete).await;
            return;
        }
        if FileTransferProtocol::is_file_purge(message) {
            self.purge_files().await;
            return;
        }
        if FileTransferProtocol::is_file_list_request(message) {
            self.send_file_list(false).await;
            return;
        }
        if FileTransferProtocol::is_file_list_confirm(message) {
            debug!(channel = %message.channel, "File list confirmed");
            return;
        }

        warn!(channel = %message.channel, "Unable to parse file transfer message");
    }

    async fn handle_upload_initiate(&self, request: FileUploadInitiate) {
        if request.name.is_empty() || request.size == 0 || request.hash.is_empty() {
            warn!("Incomplete file upload initiate");
            self.send_status(FileUploadStatus::err(
                request.name,
                FileTransferError::UnspecifiedError,
            ))
            .await;
            return;
        }

        if request.size > self.max_file_size {
            warn!(
                file = %request.name,
                size = request.size,
                "File exceeds the configured size limit"
            );
            self.send_status(FileUploadStatus::err(
                request.name,
                FileTransferError::UnsupportedFileSize,
            ))
            .await;
            return;
        }

        // Already stored?
        match self.file_repository.get_file_info(&request.name).await {
            Ok(Some(info)) => {
                let status = if info.hash == request.hash {
                    FileUploadStatus::ok(request.name, FileTransferStatus::FileReady)
                } else {
                    FileUploadStatus::err(request.name, FileTransferError::FileHashMismatch)
                };
                self.send_status(status).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "File repository lookup failed");
                self.send_status(FileUploadStatus::err(
                    request.name,
                    FileTransferError::FileSystemError,
                ))
                .await;
                return;
            }
        }

        // Already downloading?
        {
            let downloads = self.downloads.lock().await;
            if let Some(existing) = downloads.get(&request.name) {
                let status = if existing.expected_hash == request.hash {
                    info!(file = %request.name, "Download already active");
                    FileUploadStatus::ok(request.name.clone(), FileTransferStatus::FileTransfer)
                } else {
                    warn!(file = %request.name, "Active download has a different hash");
                    FileUploadStatus::err(
                        request.name.clone(),
                        FileTransferError::UnspecifiedError,
                    )
                };
                drop(downloads);
                self.send_status(status).await;
                return;
            }
        }

        let Some(expected_hash) = base64_decode(&request.hash) else {
            warn!(file = %request.name, "Initiate hash is not valid base64");
            self.send_status(FileUploadStatus::err(
                request.name,
                FileTransferError::UnspecifiedError,
            ))
            .await;
            return;
        };

        info!(file = %request.name, size = request.size, "Starting file download");
        let downloader = FileDownloader::new(
            request.name.clone(),
            request.size,
            expected_hash,
            self.max_packet_size,
        );
        let first_request = downloader.first_request();

        {
            let mut downloads = self.downloads.lock().await;
            downloads.insert(
                request.name.clone(),
                ActiveDownload {
                    expected_hash: request.hash.clone(),
                    downloader,
                    completed: false,
                },
            );
        }
        *self.active_download.lock().await = request.name.clone();

        self.send_status(FileUploadStatus::ok(
            request.name,
            FileTransferStatus::FileTransfer,
        ))
        .await;
        self.request_packet(first_request).await;
    }

    async fn handle_binary_data(&self, chunk: BinaryData) {
        let active = self.active_download.lock().await.clone();
        if active.is_empty() {
            warn!("Unexpected binary data");
            return;
        }

        let outcome = {
            let mut downloads = self.downloads.lock().await;
            let Some(entry) = downloads.get_mut(&active) else {
                warn!(file = %active, "Binary data without an active download");
                return;
            };
            if entry.completed {
                return;
            }
            entry.downloader.handle_chunk(&chunk)
        };

        match outcome {
            ChunkOutcome::Accepted(request) | ChunkOutcome::Retry(request) => {
                self.request_packet(request).await;
            }
            ChunkOutcome::Completed => self.finish_download(&active).await,
            ChunkOutcome::Failed(error) => {
                self.flag_completed(&active).await;
                *self.active_download.lock().await = String::new();
                self.send_status(FileUploadStatus::err(active, error)).await;
            }
        }
    }

    async fn finish_download(&self, name: &str) {
        let (bytes, hash) = {
            let downloads = self.downloads.lock().await;
            let Some(entry) = downloads.get(name) else {
                return;
            };
            (
                entry.downloader.bytes().to_vec(),
                entry.expected_hash.clone(),
            )
        };

        let path = self.download_directory.join(name);
        let write_result = async {
            tokio::fs::create_dir_all(&self.download_directory).await?;
            tokio::fs::write(&path, &bytes).await
        }
        .await;

        self.flag_completed(name).await;
        *self.active_download.lock().await = String::new();

        if let Err(e) = write_result {
            error!(file = %name, error = %e, "Failed to write downloaded file");
            self.send_status(FileUploadStatus::err(
                name,
                FileTransferError::FileSystemError,
            ))
            .await;
            return;
        }

        let info = FileInfo {
            name: name.to_string(),
            hash,
            path: path.to_string_lossy().into_owned(),
        };
        if let Err(e) = self.file_repository.store(&info).await {
            error!(file = %name, error = %e, "Failed to persist file info");
            self.send_status(FileUploadStatus::err(
                name,
                FileTransferError::FileSystemError,
            ))
            .await;
            return;
        }

        info!(file = %name, "File download completed");
        self.send_status(FileUploadStatus::ok(name, FileTransferStatus::FileReady))
            .await;
        self.send_file_list(true).await;
    }

    async fn handle_upload_abort(&self, request: FileUploadAbort) {
        if request.name.is_empty() {
            warn!("Missing file name from file upload abort");
            self.send_status(FileUploadStatus::err(
                request.name,
                FileTransferError::UnspecifiedError,
            ))
            .await;
            return;
        }

        let known = {
            let downloads = self.downloads.lock().await;
            downloads.contains_key(&request.name)
        };
        if !known {
            debug!(file = %request.name, "Abort for inactive download");
            return;
        }

        info!(file = %request.name, "Aborting download");
        self.flag_completed(&request.name).await;
        *self.active_download.lock().await = String::new();
        self.send_status(FileUploadStatus::ok(
            request.name,
            FileTransferStatus::Aborted,
        ))
        .await;
    }

    async fn handle_file_delete(&self, request: FileDelete) {
        if request.name.is_empty() {
            warn!("Missing file name from file delete");
            self.send_file_list(true).await;
            return;
        }
        self.delete_stored_file(&request.name).await;
        self.send_file_list(true).await;
    }

    async fn purge_files(&self) {
        let names = match self.file_repository.get_all_file_names().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to fetch file names");
                self.send_file_list(true).await;
                return;
            }
        };

        for name in names {
            self.delete_stored_file(&name).await;
        }
        self.send_file_list(true).await;
    }

    async fn delete_stored_file(&self, name: &str) {
        let info = match self.file_repository.get_file_info(name).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                warn!(file = %name, "File info missing, cannot delete");
                return;
            }
            Err(e) => {
                error!(file = %name, error = %e, "File repository lookup failed");
                return;
            }
        };

        info!(path = %info.path, "Deleting file");
        if let Err(e) = tokio::fs::remove_file(&info.path).await {
            error!(path = %info.path, error = %e, "Failed to delete file");
        }
        if let Err(e) = self.file_repository.remove(name).await {
            error!(file = %name, error = %e, "Failed to remove file info");
        }
    }

    async fn send_file_list(&self, update: bool) {
        let names = match self.file_repository.get_all_file_names().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to fetch file names");
                return;
            }
        };

        let list = FileList { files: names };
        let message = if update {
            FileTransferProtocol::make_file_list_update_message(&self.gateway_key, &list)
        } else {
            FileTransferProtocol::make_file_list_response_message(&self.gateway_key, &list)
        };
        if let Some(message) = message {
            self.platform_outbound.add_message(message).await;
        }
    }

    async fn send_status(&self, status: FileUploadStatus) {
        let Some(message) =
            FileTransferProtocol::make_file_upload_status_message(&self.gateway_key, &status)
        else {
            error!("Failed to create file upload status");
            return;
        };
        self.platform_outbound.add_message(message).await;
    }

    async fn request_packet(&self, request: FilePacketRequest) {
        let Some(message) =
            FileTransferProtocol::make_file_packet_request_message(&self.gateway_key, &request)
        else {
            warn!("Failed to create file packet request");
            return;
        };
        self.platform_outbound.add_message(message).await;
    }

    async fn flag_completed(&self, name: &str) {
        let mut downloads = self.downloads.lock().await;
        if let Some(entry) = downloads.get_mut(name) {
            entry.completed = true;
        }
        self.gc_wake.notify_one();
    }
}
