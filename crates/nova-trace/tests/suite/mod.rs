mod config_file;
mod document;
mod driver;
mod heap_graph;
mod stepping;
