pub mod catalog;
pub mod customer;
pub mod line_item;
pub mod quotation;
pub mod vehicle;
pub mod workorder;
