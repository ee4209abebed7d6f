// Pipeline processing: merging listing and detail data into canonical records

pub mod merge;
