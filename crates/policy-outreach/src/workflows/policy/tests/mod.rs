mod common;
mod diagnosis;
mod evaluation;
