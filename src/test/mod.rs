mod support;

mod command;
mod convert;
mod reference;
mod table;
