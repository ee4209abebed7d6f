// Adapters implementing the application ports

pub mod firestore;
pub mod http_client;
pub mod in_memory_store;

pub use firestore::FirestoreStore;
pub use http_client::ReqwestHttp;
pub use in_memory_store::InMemoryStore;
