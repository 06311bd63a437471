pub mod analytics;
pub mod customer;
pub mod distributor;
pub mod installation;
pub mod inventory;
pub mod lead;
pub mod product;
pub mod system;
pub mod tech_app;
pub mod technician;
pub mod utils;
pub mod warehouse;
pub mod webhook;
