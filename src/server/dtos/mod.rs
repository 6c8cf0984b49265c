pub mod drama_dto;
pub mod health_dto;
