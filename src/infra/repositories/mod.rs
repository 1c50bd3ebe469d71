pub mod postgres_booking_repo;
pub mod postgres_job_repo;
pub mod postgres_slot_repo;
pub mod postgres_user_repo;
