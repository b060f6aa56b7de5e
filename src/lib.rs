#![allow(missing_docs)]

pub mod backend;
pub mod body;
pub mod cache;
pub mod error;
pub mod evidence;
pub mod fitter;
pub mod function;
pub mod loss;
pub mod mesh;
pub mod optimize;
