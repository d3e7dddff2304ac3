//! Aave v3 read-only interfaces
//!
//! Only the view functions the monitor needs. Field order of
//! `AggregatedReserveData` must match UiPoolDataProviderV3 exactly.

use alloy_sol_types::sol;

sol! {
    /// Market registry; resolves the Pool and the protocol data provider
    interface IPoolAddressesProvider {
        function getPool() external view returns (address);
        function getPoolDataProvider() external view returns (address);
    }

    /// AaveProtocolDataProvider
    interface IPoolDataProvider {
        function getReserveConfigurationData(address asset) external view returns (
            uint256 decimals,
            uint256 ltv,
            uint256 liquidationThreshold,
            uint256 liquidationBonus,
            uint256 reserveFactor,
            bool usageAsCollateralEnabled,
            bool borrowingEnabled,
            bool stableBorrowRateEnabled,
            bool isActive,
            bool isFrozen
        );

        function getReserveData(address asset) external view returns (
            uint256 unbacked,
            uint256 accruedToTreasuryScaled,
            uint256 totalAToken,
            uint256 totalStableDebt,
            uint256 totalVariableDebt,
            uint256 liquidityRate,
            uint256 variableBorrowRate,
            uint256 stableBorrowRate,
            uint256 averageStableBorrowRate,
            uint256 liquidityIndex,
            uint256 variableBorrowIndex,
            uint40 lastUpdateTimestamp
        );

        function getReserveCaps(address asset) external view returns (uint256 borrowCap, uint256 supplyCap);

        function getReserveEModeCategory(address asset) external view returns (uint256);
    }

    /// UiPoolDataProviderV3
    interface IUiPoolDataProviderV3 {
        struct AggregatedReserveData {
            address underlyingAsset;
            string name;
            string symbol;
            uint256 decimals;
            uint256 baseLTVasCollateral;
            uint256 reserveLiquidationThreshold;
            uint256 reserveLiquidationBonus;
            uint256 reserveFactor;
            bool usageAsCollateralEnabled;
            bool borrowingEnabled;
            bool stableBorrowRateEnabled;
            bool isActive;
            bool isFrozen;
            uint128 liquidityIndex;
            uint128 variableBorrowIndex;
            uint128 liquidityRate;
            uint128 variableBorrowRate;
            uint128 stableBorrowRate;
            uint40 lastUpdateTimestamp;
            address aTokenAddress;
            address stableDebtTokenAddress;
            address variableDebtTokenAddress;
            address interestRateStrategyAddress;
            uint256 availableLiquidity;
            uint256 totalPrincipalStableDebt;
            uint256 averageStableRate;
            uint256 stableDebtLastUpdateTimestamp;
            uint256 totalScaledVariableDebt;
            uint256 priceInMarketReferenceCurrency;
            address priceOracle;
            uint256 variableRateSlope1;
            uint256 variableRateSlope2;
            uint256 stableRateSlope1;
            uint256 stableRateSlope2;
            uint256 baseStableBorrowRate;
            uint256 baseVariableBorrowRate;
            uint256 optimalUsageRatio;
            bool isPaused;
            bool isSiloedBorrowing;
            uint128 accruedToTreasury;
            uint128 unbacked;
            uint128 isolationModeTotalDebt;
            bool flashLoanEnabled;
            uint256 debtCeiling;
            uint256 debtCeilingDecimals;
            uint8 eModeCategoryId;
            uint256 borrowCap;
            uint256 supplyCap;
            uint16 eModeLtv;
            uint16 eModeLiquidationThreshold;
            uint16 eModeLiquidationBonus;
            address eModePriceSource;
            string eModeLabel;
            bool borrowableInIsolation;
        }

        struct BaseCurrencyInfo {
            uint256 marketReferenceCurrencyUnit;
            int256 marketReferenceCurrencyPriceInUsd;
            int256 networkBaseTokenPriceInUsd;
            uint8 networkBaseTokenPriceDecimals;
        }

        function getReservesList(address provider) external view returns (address[] memory);

        function getReservesData(address provider) external view returns (
            AggregatedReserveData[] memory,
            BaseCurrencyInfo memory
        );
    }

    /// Pool (E-Mode reads)
    interface IPool {
        struct EModeCategoryLegacy {
            uint16 ltv;
            uint16 liquidationThreshold;
            uint16 liquidationBonus;
            address priceSource;
            string label;
        }

        function getReservesList() external view returns (address[] memory);

        function getEModeCategoryData(uint8 id) external view returns (EModeCategoryLegacy memory);
    }
}
