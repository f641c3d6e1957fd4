pub mod mock_acq;
