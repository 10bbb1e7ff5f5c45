//----------------------------------------------------------------------------------------------
// Module daq
// DAQ optimizer (C9) and decoder (C10). See daq::planner and daq::decoder.

pub mod decoder;
pub mod planner;
