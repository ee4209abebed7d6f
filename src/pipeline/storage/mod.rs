// Pipeline storage: the intermediate artifact shared by collect and load

pub mod dataset;
