pub mod coordinates;
pub mod local_cache;
pub mod metadata_xml;
pub mod paths;
pub mod pom;
pub mod pom_xml;
pub mod repository;
pub mod retrieval;
