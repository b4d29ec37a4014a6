pub mod stmmac;
