//! Chunked file transfer sub-protocol (platform side only).

use crate::codec::{make_json, parse_json};
use crate::topics::{self, Topics};
use edge_bridge_models::{
    BinaryData, FileDelete, FileList, FilePacketRequest, FileUploadAbort, FileUploadInitiate,
    FileUploadStatus, Message,
};

pub struct FileTransferProtocol;

impl FileTransferProtocol {
    pub fn inbound_platform_channels(gateway_key: &str) -> Vec<String> {
        [
            topics::FILE_UPLOAD_INITIATE,
            topics::FILE_UPLOAD_BINARY,
            topics::FILE_UPLOAD_ABORT,
            topics::FILE_DELETE,
            topics::FILE_PURGE,
            topics::FILE_LIST_REQUEST,
            topics::FILE_LIST_CONFIRM,
        ]
        .iter()
        .map(|kind| Topics::gateway(topics::P2D, kind, gateway_key))
        .collect()
    }

    fn channel_is(message: &Message, kind: &str) -> bool {
        Topics::extract_kind(&message.channel) == Some(kind)
    }

    pub fn make_file_upload_initiate(message: &Message) -> Option<FileUploadInitiate> {
        if !Self::channel_is(message, topics::FILE_UPLOAD_INITIATE) {
            return None;
        }
        parse_json(message)
    }

    pub fn make_binary_data(message: &Message) -> Option<BinaryData> {
        if !Self::channel_is(message, topics::FILE_UPLOAD_BINARY) {
            return None;
        }
        BinaryData::from_bytes(&message.content)
    }

    pub fn make_file_upload_abort(message: &Message) -> Option<FileUploadAbort> {
        if !Self::channel_is(message, topics::FILE_UPLOAD_ABORT) {
            return None;
        }
        parse_json(message)
    }

    pub fn make_file_delete(message: &Message) -> Option<FileDelete> {
        if !Self::channel_is(message, topics::FILE_DELETE) {
            return None;
        }
        parse_json(message)
    }

    pub fn is_file_purge(message: &Message) -> bool {
        Self::channel_is(message, topics::FILE_PURGE)
    }

    pub fn is_file_list_request(message: &Message) -> bool {
        Self::channel_is(message, topics::FILE_LIST_REQUEST)
    }

    pub fn is_file_list_confirm(message: &Message) -> bool {
        Self::channel_is(message, topics::FILE_LIST_CONFIRM)
    }

    pub fn make_file_upload_status_message(
        gateway_key: &str,
        status: &FileUploadStatus,
    ) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::FILE_UPLOAD_STATUS, gateway_key);
        make_json(channel, status)
    }

    pub fn make_file_packet_request_message(
        gateway_key: &str,
        request: &FilePacketRequest,
    ) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::FILE_PACKET_REQUEST, gateway_key);
        make_json(channel, request)
    }

    pub fn make_file_list_response_message(gateway_key: &str, list: &FileList) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::FILE_LIST_RESPONSE, gateway_key);
        make_json(channel, list)
    }

    pub fn make_file_list_update_message(gateway_key: &str, list: &FileList) -> Option<Message> {
        let channel = Topics::gateway(topics::D2P, topics::FILE_LIST_UPDATE, gateway_key);
        make_json(channel, list)
    }

    // Platform-originated messages, used by tests and simulators.

    pub fn make_file_upload_initiate_message(
        gateway_key: &str,
        initiate: &FileUploadInitiate,
    ) -> Option<Message> {
        let channel = Topics::gateway(topics::P2D, topics::FILE_UPLOAD_INITIATE, gateway_key);
        make_json(channel, initiate)
    }

    pub fn make_binary_data_message(gateway_key: &str, chunk: &BinaryData) -> Message {
        Message::new(
            Topics::gateway(topics::P2D, topics::FILE_UPLOAD_BINARY, gateway_key),
            chunk.to_bytes(),
        )
    }

    pub fn make_file_upload_abort_message(
        gateway_key: &str,
        abort: &FileUploadAbort,
    ) -> Option<Message> {
        let channel = Topics::gateway(topics::P2D, topics::FILE_UPLOAD_ABORT, gateway_key);
        make_json(channel, abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_bridge_models::transfer::CHUNK_HASH_LEN;

    #[test]
    fn initiate_roundtrip() {
        let initiate = FileUploadInitiate {
            name: "fw.bin".to_string(),
            size: 3000,
            hash: "aGFzaA==".to_string(),
        };
        let msg =
            FileTransferProtocol::make_file_upload_initiate_message("GW", &initiate).unwrap();
        assert_eq!(msg.channel, "p2d/file_upload_initiate/g/GW");
        assert_eq!(
            FileTransferProtocol::make_file_upload_initiate(&msg).unwrap(),
            initiate
        );
        // Wrong channel kind does not parse
        assert!(FileTransferProtocol::make_file_upload_abort(&msg).is_none());
    }

    #[test]
    fn binary_roundtrip() {
        let chunk = BinaryData::make([0u8; CHUNK_HASH_LEN], b"payload");
        let msg = FileTransferProtocol::make_binary_data_message("GW", &chunk);
        assert_eq!(FileTransferProtocol::make_binary_data(&msg).unwrap(), chunk);
    }

    #[test]
    fn flag_channels() {
        let purge = Message::new("p2d/file_purge/g/GW", &b""[..]);
        assert!(FileTransferProtocol::is_file_purge(&purge));
        let list = Message::new("p2d/file_list_request/g/GW", &b""[..]);
        assert!(FileTransferProtocol::is_file_list_request(&list));
        assert!(!FileTransferProtocol::is_file_purge(&list));
    }

    #[test]
    fn outbound_channels() {
        let status = FileUploadStatus::ok("fw.bin", edge_bridge_models::FileTransferStatus::FileReady);
        let msg = FileTransferProtocol::make_file_upload_status_message("GW", &status).unwrap();
        assert_eq!(msg.channel, "d2p/file_upload_status/g/GW");

        let request = FilePacketRequest {
            file_name: "fw.bin".to_string(),
            chunk_index: 2,
        };
        let msg = FileTransferProtocol::make_file_packet_request_message("GW", &request).unwrap();
        assert_eq!(msg.channel, "d2p/file_upload_packet_request/g/GW");
    }
}
