//! Portal services: business logic behind the HTTP routes.

pub mod auth;
pub mod content_service;
pub mod csrf;
pub mod enrollment_service;
pub mod journal_service;
pub mod notification_service;
pub mod product_service;
pub mod rate_limit;
pub mod roadmap_service;
pub mod semester_service;
pub mod telegram_service;
pub mod user_service;
pub mod workflow_service;
